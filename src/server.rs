//! HTTP/1 server running a [`Handler`]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::handler::Handler;
use crate::recorder::Recorder;
use crate::Result;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// A running server
///
/// Request bodies are read in full before the handler runs. The handler
/// writes into a buffered writer that becomes the response once it returns.
/// Dropping the server stops accepting connections and closes idle ones.
pub struct Server {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl Server {
    /// Bind `addr` and start serving `handler`
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind<H>(addr: SocketAddr, handler: H) -> Result<Self>
    where
        H: Handler + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!("Listening on {local_addr}");

        let shutdown_rx = shutdown_tx.subscribe();
        let task = tokio::spawn(accept_loop(listener, Arc::new(handler), shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown_tx,
            task: Some(task),
        })
    }

    /// Serve `handler` on an ephemeral loopback port
    ///
    /// # Errors
    ///
    /// Returns error if no port can be bound
    pub async fn start<H>(handler: H) -> Result<Self>
    where
        H: Handler + 'static,
    {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), handler).await
    }

    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Base URL, `http://ip:port`
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Stop accepting connections and close the open ones
    ///
    /// Idle connections close at once and requests in flight are answered
    /// first. Connections still open after [`SHUTDOWN_TIMEOUT_MS`] are
    /// aborted.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send(()).ok();

        if let Some(mut task) = self.task.take() {
            let timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Accept loop failed: {e}"),
                Err(_) => {
                    warn!("Connections did not close within {timeout:?}, aborting");
                    task.abort();
                }
            }
        }

        info!("Server on {} stopped", self.local_addr);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown_tx.send(()).ok();
    }
}

async fn accept_loop<H>(
    listener: TcpListener,
    handler: Arc<H>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    H: Handler + 'static,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {peer_addr}");
                        let handler = Arc::clone(&handler);
                        let shutdown_rx = shutdown_rx.resubscribe();

                        connections.spawn(serve_connection(stream, peer_addr, handler, shutdown_rx));
                    }
                    Err(e) => {
                        error!("Accept error: {e}");
                    }
                }
            }
            Some(result) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = result {
                    warn!("Connection task failed: {e}");
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Accept loop shutting down");
                break;
            }
        }
    }

    drop(listener);

    while let Some(result) = connections.join_next().await {
        if let Err(e) = result {
            warn!("Connection task failed: {e}");
        }
    }
}

/// Serve one connection until the peer closes it or shutdown is signalled
///
/// On shutdown an idle connection is closed at once; a request in flight is
/// answered first.
async fn serve_connection<H>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    H: Handler + 'static,
{
    let service = service_fn(move |request| {
        let handler = Arc::clone(&handler);
        async move { dispatch(handler.as_ref(), request).await }
    });

    let conn = http1::Builder::new()
        .title_case_headers(true)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    debug!("Connection from {peer_addr} closed: {e}");
                }
                break;
            }
            _ = shutdown_rx.recv(), if !draining => {
                debug!("Closing connection from {peer_addr}");
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Run one request through `handler`
async fn dispatch<H: Handler>(
    handler: &H,
    request: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = request.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {e}");
            let mut response = Response::new(Full::new(Bytes::from_static(b"bad request body\n")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let request = Request::from_parts(parts, body);
    let mut writer = Recorder::new();
    handler.serve_http(&mut writer, &request).await;

    Ok(writer.finish().map(Full::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::handler::{NotFound, ResponseWriter};

    fn hello(writer: &mut dyn ResponseWriter, _request: &Request<Bytes>) {
        writer.write_body(b"hello").unwrap();
    }

    fn echo(writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        writer.write_body(request.body()).unwrap();
    }

    #[tokio::test]
    async fn test_serves_handler() {
        let server = Server::start(hello).await.unwrap();
        let client: Client = Client::default();

        let response = client.get(&server.url()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_body_reaches_handler() {
        let server = Server::start(echo).await.unwrap();
        let client: Client = Client::default();

        let request = Request::builder()
            .method("POST")
            .uri(format!("{}/echo", server.url()))
            .body(Bytes::from_static(b"ping"))
            .unwrap();
        let response = client.send(request).await.unwrap();

        assert_eq!(response.body().as_ref(), b"ping");
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_not_found_status() {
        let server = Server::start(NotFound).await.unwrap();
        let client: Client = Client::default();

        let response = client.get(&format!("{}/missing", server.url())).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let server = Server::start(hello).await.unwrap();
        let url = server.url();
        server.shutdown().await;

        let client: Client = Client::default();
        assert!(client.get(&url).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_pooled_connections() {
        let server = Server::start(hello).await.unwrap();
        let url = server.url();
        let client: Client = Client::default();

        // Leaves an idle keep-alive connection in the client pool.
        client.get(&url).await.unwrap();

        let started = std::time::Instant::now();
        server.shutdown().await;
        assert!(started.elapsed() < Duration::from_millis(SHUTDOWN_TIMEOUT_MS));

        assert!(client.get(&url).await.is_err());
    }
}
