//! Client-side transport contract and the hyper-backed default

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, USER_AGENT};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::config::{default_user_agent, ClientConfig};
use crate::{Result, WiretapError};

/// Sends one request and returns its response
pub trait Transport: Send + Sync {
    /// Perform a single request/response exchange
    fn round_trip(&self, request: Request<Bytes>)
        -> impl Future<Output = Result<Response<Bytes>>> + Send;

    /// Add the headers this transport puts on the wire
    ///
    /// Must be idempotent. The default adds nothing.
    fn prepare(&self, _request: &mut Request<Bytes>) {}
}

/// Transport over hyper's pooled HTTP/1 client
///
/// Header names go out in title case so the wire matches the dumps.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    user_agent: HeaderValue,
}

impl HyperTransport {
    /// Create a transport with default settings
    #[must_use]
    pub fn new() -> Self {
        let user_agent = HeaderValue::from_str(&default_user_agent())
            .unwrap_or_else(|_| HeaderValue::from_static("wiretap"));
        Self::build(&ClientConfig::default(), user_agent)
    }

    /// Create a transport from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configured User-Agent is not a valid header value
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let user_agent = HeaderValue::from_str(&config.user_agent).map_err(|e| {
            WiretapError::ConfigError(format!("Invalid user agent {:?}: {e}", config.user_agent))
        })?;

        Ok(Self::build(config, user_agent))
    }

    fn build(config: &ClientConfig, user_agent: HeaderValue) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http1_title_case_headers(true)
            .build_http();

        Self { client, user_agent }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    async fn round_trip(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.prepare(&mut request);
        debug!("Sending {} {}", request.method(), request.uri());

        let response = self
            .client
            .request(request.map(Full::new))
            .await
            .map_err(|e| {
                warn!("Request failed: {e}");
                WiretapError::Request(e)
            })?;

        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(Response::from_parts(parts, body))
    }

    fn prepare(&self, request: &mut Request<Bytes>) {
        let mut leading = HeaderMap::new();

        if !request.headers().contains_key(HOST) {
            // Userinfo never goes into Host.
            if let Some(host) = request.uri().authority().and_then(|authority| {
                let host = match authority.port() {
                    Some(port) => format!("{}:{}", authority.host(), port.as_str()),
                    None => authority.host().to_string(),
                };
                HeaderValue::from_str(&host).ok()
            }) {
                leading.insert(HOST, host);
            }
        }

        if !request.headers().contains_key(USER_AGENT) {
            leading.insert(USER_AGENT, self.user_agent.clone());
        }

        let needs_length = !request.body().is_empty()
            && !request.headers().contains_key(CONTENT_LENGTH)
            && !request.headers().contains_key(TRANSFER_ENCODING);

        if !leading.is_empty() {
            let rest = std::mem::replace(request.headers_mut(), leading);
            request.headers_mut().extend(rest);
        }

        if needs_length {
            let length = HeaderValue::from(request.body().len());
            request.headers_mut().insert(CONTENT_LENGTH, length);
        }
    }
}
