//! Minimal HTTP client over any transport

use bytes::Bytes;
use hyper::{Method, Request, Response};

use crate::transport::{HyperTransport, Transport};
use crate::Result;

/// HTTP client that sends through a [`Transport`]
///
/// Plug an [`OutboundInterceptor`](crate::OutboundInterceptor) in as the
/// transport to dump everything the client sends and receives.
#[derive(Debug, Clone, Default)]
pub struct Client<T = HyperTransport> {
    transport: T,
}

impl<T: Transport> Client<T> {
    /// Create a client sending through `transport`
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Send a `GET` request
    ///
    /// # Errors
    ///
    /// Returns error if `uri` is invalid or the transport fails
    pub async fn get(&self, uri: &str) -> Result<Response<Bytes>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Bytes::new())?;

        self.send(request).await
    }

    /// Send a request
    ///
    /// # Errors
    ///
    /// Returns error if the transport fails
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.transport.round_trip(request).await
    }

    /// The underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }
}
