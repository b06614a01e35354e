//! Inbound interception by handler substitution

use std::sync::Arc;

use bytes::Bytes;
use hyper::{Request, Response};
use tracing::{debug, warn};

use crate::dump::{RenderRequestFn, RenderResponseFn, Renderer};
use crate::handler::{Handler, NotFound, ResponseWriter};
use crate::recorder::{self, Recorder};
use crate::sink::Sink;
use crate::Result;

/// Handler that dumps every request and the response its delegate produced
///
/// The delegate writes into a fresh [`Recorder`]; the recorded response is
/// dumped and then replayed onto the real writer.
#[derive(Clone)]
pub struct InboundInterceptor<H = NotFound> {
    handler: H,
    render_request: RenderRequestFn,
    render_response: RenderResponseFn,
    sink: Sink,
}

impl<H: Handler> InboundInterceptor<H> {
    /// Wrap `handler`, dumping full requests and responses to the global sink
    pub fn new(handler: H) -> Self {
        let renderer = Renderer::default();
        Self {
            handler,
            render_request: renderer.request_fn(),
            render_response: renderer.response_fn(),
            sink: Sink::Global,
        }
    }

    /// Swap the delegate, keeping renderers and sink
    pub fn with_handler<G: Handler>(self, handler: G) -> InboundInterceptor<G> {
        InboundInterceptor {
            handler,
            render_request: self.render_request,
            render_response: self.render_response,
            sink: self.sink,
        }
    }

    /// Replace the delegate
    pub fn set_handler(&mut self, handler: H) {
        self.handler = handler;
    }

    /// The delegate handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Render both requests and responses with `renderer`
    #[must_use]
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.render_request = renderer.request_fn();
        self.render_response = renderer.response_fn();
        self
    }

    /// Replace the request rendering function
    #[must_use]
    pub fn with_request_renderer<F>(mut self, render: F) -> Self
    where
        F: Fn(&Request<Bytes>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.render_request = Arc::new(render);
        self
    }

    /// Replace the response rendering function
    #[must_use]
    pub fn with_response_renderer<F>(mut self, render: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.render_response = Arc::new(render);
        self
    }

    /// Print dumps to `sink` instead of the global destination
    #[must_use]
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    /// Dump `request`, run the delegate, dump its response and replay it onto `writer`
    ///
    /// # Errors
    ///
    /// Returns error if `writer` rejects the replayed body
    pub async fn handle(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<Bytes>,
    ) -> Result<()> {
        debug!("Dumping inbound {} {}", request.method(), request.uri());
        self.sink.print_rendered(&(self.render_request)(request));

        let mut recorder = Recorder::new();
        self.handler.serve_http(&mut recorder, request).await;
        let response = recorder.finish();

        debug!("Dumping outbound response {}", response.status());
        self.sink.print_rendered(&(self.render_response)(&response));

        recorder::replay(&response, writer)?;
        Ok(())
    }
}

impl Default for InboundInterceptor<NotFound> {
    fn default() -> Self {
        Self::new(NotFound)
    }
}

impl<H: Handler> Handler for InboundInterceptor<H> {
    async fn serve_http(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        if let Err(e) = self.handle(writer, request).await {
            warn!(
                "Failed to replay response for {} {}: {e}",
                request.method(),
                request.uri()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Capture;
    use crate::WiretapError;
    use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use hyper::StatusCode;
    use std::io;

    fn hello(writer: &mut dyn ResponseWriter, _request: &Request<Bytes>) {
        writer.write_body(b"hello").unwrap();
    }

    fn created(writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        let headers = writer.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append("x-echo", HeaderValue::from_static("one"));
        headers.append("x-echo", HeaderValue::from_static("two"));
        writer.write_status(StatusCode::CREATED);
        writer.write_body(request.body()).unwrap();
    }

    struct Hangup {
        headers: HeaderMap,
    }

    impl ResponseWriter for Hangup {
        fn headers_mut(&mut self) -> &mut HeaderMap {
            &mut self.headers
        }

        fn write_status(&mut self, _status: StatusCode) {}

        fn write_body(&mut self, _buf: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer hung up"))
        }
    }

    fn post(body: &'static [u8]) -> Request<Bytes> {
        Request::builder()
            .method("POST")
            .uri("/items")
            .header("host", "example.com")
            .body(Bytes::from_static(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_is_not_found() {
        let capture = Capture::new();
        let interceptor = InboundInterceptor::default().with_sink(Sink::from(capture.clone()));
        let mut writer = Recorder::new();

        interceptor
            .handle(&mut writer, &Request::new(Bytes::new()))
            .await
            .unwrap();

        assert_eq!(writer.finish().status(), StatusCode::NOT_FOUND);
        assert!(capture.contents().contains("HTTP/1.1 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn test_swapped_handler_dumps_and_replays() {
        let capture = Capture::new();
        let interceptor = InboundInterceptor::default()
            .with_sink(Sink::from(capture.clone()))
            .with_handler(hello);
        let mut writer = Recorder::new();

        interceptor
            .handle(&mut writer, &post(b""))
            .await
            .unwrap();

        let response = writer.finish();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(
            capture.contents(),
            "POST /items HTTP/1.1\r\nHost: example.com\r\n\r\n\n\
             HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nhello\n"
        );
    }

    #[tokio::test]
    async fn test_replay_matches_direct_handler_output() {
        let interceptor = InboundInterceptor::new(created).with_sink(Sink::from(Capture::new()));
        let request = post(b"{\"id\":7}");

        let mut direct = Recorder::new();
        created(&mut direct, &request);
        let expected = direct.finish();

        let mut writer = Recorder::new();
        interceptor.handle(&mut writer, &request).await.unwrap();
        let replayed = writer.finish();

        assert_eq!(replayed.status(), expected.status());
        assert_eq!(replayed.headers(), expected.headers());
        assert_eq!(replayed.body(), expected.body());
    }

    #[tokio::test]
    async fn test_replay_failure_is_returned() {
        let capture = Capture::new();
        let interceptor = InboundInterceptor::new(hello).with_sink(Sink::from(capture.clone()));
        let mut writer = Hangup {
            headers: HeaderMap::new(),
        };

        let result = interceptor.handle(&mut writer, &post(b"")).await;

        assert!(matches!(result, Err(WiretapError::Io(_))));
        // Both dumps happen before the replay.
        assert!(capture.contents().ends_with("hello\n"));
        assert_eq!(writer.headers[CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_handler_contract_swallows_replay_failure() {
        let interceptor = InboundInterceptor::new(hello).with_sink(Sink::from(Capture::new()));
        let mut writer = Hangup {
            headers: HeaderMap::new(),
        };

        interceptor.serve_http(&mut writer, &post(b"")).await;
    }

    #[tokio::test]
    async fn test_set_handler() {
        let capture = Capture::new();
        let mut interceptor = InboundInterceptor::new(NotFound).with_sink(Sink::from(capture.clone()));
        interceptor.set_handler(NotFound);

        let mut writer = Recorder::new();
        interceptor.handle(&mut writer, &post(b"")).await.unwrap();

        assert_eq!(writer.finish().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_response_render_failure_still_replays() {
        let capture = Capture::new();
        let interceptor = InboundInterceptor::new(hello)
            .with_sink(Sink::from(capture.clone()))
            .with_response_renderer(|_: &Response<Bytes>| {
                Err(WiretapError::Render("cannot render".to_string()))
            });
        let mut writer = Recorder::new();

        interceptor.handle(&mut writer, &post(b"")).await.unwrap();

        assert_eq!(writer.finish().body().as_ref(), b"hello");
        assert!(capture.contents().ends_with("\n\nRender error: cannot render\n\n"));
    }
}
