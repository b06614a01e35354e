//! Server-side handler contract

use std::future::{self, Future};
use std::io;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Request, StatusCode};
use tracing::debug;

/// Destination a handler writes its response into
///
/// Headers may be changed until the status is written. Writing the body
/// first implies status `200 OK`.
pub trait ResponseWriter: Send {
    /// Response headers
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write the status; only the first call has any effect
    fn write_status(&mut self, status: StatusCode);

    /// Append bytes to the body
    ///
    /// # Errors
    ///
    /// Returns error if the destination can no longer accept bytes
    fn write_body(&mut self, buf: &[u8]) -> io::Result<()>;
}

/// Handles one request by writing a response
///
/// Implemented by any `Fn(&mut dyn ResponseWriter, &Request<Bytes>)`, so
/// plain functions work as handlers.
pub trait Handler: Send + Sync {
    /// Serve one request
    fn serve_http(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<Bytes>,
    ) -> impl Future<Output = ()> + Send;
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    fn serve_http(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<Bytes>,
    ) -> impl Future<Output = ()> + Send {
        self(writer, request);
        future::ready(())
    }
}

/// Answers every request with `404 page not found`
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn serve_http(
        &self,
        writer: &mut dyn ResponseWriter,
        _request: &Request<Bytes>,
    ) -> impl Future<Output = ()> + Send {
        error(writer, "404 page not found", StatusCode::NOT_FOUND);
        future::ready(())
    }
}

/// Write a plain-text error response
///
/// The message is written with a trailing newline.
pub fn error(writer: &mut dyn ResponseWriter, message: &str, status: StatusCode) {
    let headers = writer.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        hyper::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    writer.write_status(status);

    let mut body = Vec::with_capacity(message.len() + 1);
    body.extend_from_slice(message.as_bytes());
    body.push(b'\n');
    if let Err(e) = writer.write_body(&body) {
        debug!("Failed to write error body: {e}");
    }
}
