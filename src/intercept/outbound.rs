//! Outbound interception at the transport level

use std::sync::Arc;

use bytes::Bytes;
use hyper::{Request, Response};
use tracing::debug;

use crate::dump::{RenderRequestFn, RenderResponseFn, Renderer};
use crate::sink::Sink;
use crate::transport::{HyperTransport, Transport};
use crate::Result;

/// Transport that dumps every request and every successful response
///
/// The request is dumped as the wrapped transport will send it, after
/// [`Transport::prepare`]. When the wrapped transport fails nothing but the
/// request is dumped, and the error is returned untouched.
#[derive(Clone)]
pub struct OutboundInterceptor<T = HyperTransport> {
    transport: T,
    render_request: RenderRequestFn,
    render_response: RenderResponseFn,
    sink: Sink,
}

impl<T: Transport> OutboundInterceptor<T> {
    /// Wrap `transport`, dumping full requests and responses to the global sink
    pub fn new(transport: T) -> Self {
        let renderer = Renderer::default();
        Self {
            transport,
            render_request: renderer.request_fn(),
            render_response: renderer.response_fn(),
            sink: Sink::Global,
        }
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

    /// The wrapped transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unwrap the transport
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl Default for OutboundInterceptor<HyperTransport> {
    fn default() -> Self {
        Self::new(HyperTransport::new())
    }
}

impl<T: Transport> Transport for OutboundInterceptor<T> {
    async fn round_trip(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.transport.prepare(&mut request);

        debug!("Dumping outbound {} {}", request.method(), request.uri());
        self.sink.print_rendered(&(self.render_request)(&request));

        let outcome = self.transport.round_trip(request).await;

        if let Ok(response) = &outcome {
            debug!("Dumping inbound response {}", response.status());
            self.sink.print_rendered(&(self.render_response)(response));
        }

        outcome
    }

    fn prepare(&self, request: &mut Request<Bytes>) {
        self.transport.prepare(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Capture;
    use crate::WiretapError;
    use hyper::StatusCode;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<&'static str>>>;

    /// Transport answering every request from a canned outcome
    struct Canned {
        events: Events,
        fail: bool,
    }

    impl Transport for Canned {
        async fn round_trip(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
            self.events.lock().unwrap().push("transport");
            assert_eq!(request.headers()["x-prepared"], "yes");

            if self.fail {
                return Err(WiretapError::Other("connection refused".to_string()));
            }

            let mut response = Response::new(Bytes::from_static(b"hello"));
            *response.status_mut() = StatusCode::ACCEPTED;
            Ok(response)
        }

        fn prepare(&self, request: &mut Request<Bytes>) {
            request
                .headers_mut()
                .insert("x-prepared", hyper::header::HeaderValue::from_static("yes"));
        }
    }

    fn traced(fail: bool) -> (OutboundInterceptor<Canned>, Events) {
        let events = Events::default();
        let transport = Canned {
            events: Arc::clone(&events),
            fail,
        };

        let request_events = Arc::clone(&events);
        let response_events = Arc::clone(&events);
        let interceptor = OutboundInterceptor::new(transport)
            .with_sink(Sink::from(Capture::new()))
            .with_request_renderer(move |_: &Request<Bytes>| {
                request_events.lock().unwrap().push("request");
                Ok(Vec::new())
            })
            .with_response_renderer(move |_: &Response<Bytes>| {
                response_events.lock().unwrap().push("response");
                Ok(Vec::new())
            });

        (interceptor, events)
    }

    fn get() -> Request<Bytes> {
        Request::builder()
            .uri("http://example.com/")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_dumps_request_then_response() {
        let (interceptor, events) = traced(false);

        let response = interceptor.round_trip(get()).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body().as_ref(), b"hello");
        assert_eq!(
            *events.lock().unwrap(),
            ["request", "transport", "response"]
        );
    }

    #[tokio::test]
    async fn test_failure_skips_response_dump() {
        let (interceptor, events) = traced(true);

        let result = interceptor.round_trip(get()).await;

        match result {
            Err(WiretapError::Other(message)) => assert_eq!(message, "connection refused"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(*events.lock().unwrap(), ["request", "transport"]);
    }

    #[tokio::test]
    async fn test_dump_sees_prepared_request() {
        let capture = Capture::new();
        let interceptor = OutboundInterceptor::new(Canned {
            events: Events::default(),
            fail: false,
        })
        .with_sink(Sink::from(capture.clone()));

        interceptor.round_trip(get()).await.unwrap();

        assert_eq!(
            capture.contents(),
            "GET / HTTP/1.1\r\nX-Prepared: yes\r\n\r\n\n\
             HTTP/1.1 202 Accepted\r\n\r\nhello\n"
        );
    }

    #[tokio::test]
    async fn test_render_failure_is_printed_and_request_proceeds() {
        let capture = Capture::new();
        let events = Events::default();
        let interceptor = OutboundInterceptor::new(Canned {
            events: Arc::clone(&events),
            fail: false,
        })
        .with_sink(Sink::from(capture.clone()))
        .with_request_renderer(|_: &Request<Bytes>| {
            Err(WiretapError::Render("body already consumed".to_string()))
        });

        let response = interceptor.round_trip(get()).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(capture
            .contents()
            .starts_with("Render error: body already consumed\n\nHTTP/1.1 202 Accepted"));
        assert_eq!(*events.lock().unwrap(), ["transport"]);
    }

    #[tokio::test]
    async fn test_nested_interceptors() {
        let inner_capture = Capture::new();
        let outer_capture = Capture::new();
        let inner = OutboundInterceptor::new(Canned {
            events: Events::default(),
            fail: false,
        })
        .with_sink(Sink::from(inner_capture.clone()));
        let outer = OutboundInterceptor::new(inner).with_sink(Sink::from(outer_capture.clone()));

        outer.round_trip(get()).await.unwrap();

        assert_eq!(inner_capture.contents(), outer_capture.contents());
    }
}
