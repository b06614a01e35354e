//! Wire-format rendering of requests and responses
//!
//! Requests render as `METHOD /path HTTP/x.y`, responses as
//! `HTTP/x.y CODE Reason`, each followed by one `Name: value` line per
//! header value, a blank line, and the body. Lines end in CRLF.

use std::sync::Arc;

use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::{Request, Response, Version};

use crate::config::DumpConfig;
use crate::{Result, WiretapError};

/// Renders a request to dump bytes
pub type RenderRequestFn = Arc<dyn Fn(&Request<Bytes>) -> Result<Vec<u8>> + Send + Sync>;

/// Renders a response to dump bytes
pub type RenderResponseFn = Arc<dyn Fn(&Response<Bytes>) -> Result<Vec<u8>> + Send + Sync>;

/// Default body size limit for rendering (1 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rendering options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renderer {
    /// Include the body after the header block
    pub body: bool,
    /// Bodies larger than this fail to render
    pub max_body_size: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            body: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl From<&DumpConfig> for Renderer {
    fn from(config: &DumpConfig) -> Self {
        Self {
            body: config.body,
            max_body_size: config.max_body_size,
        }
    }
}

impl Renderer {
    /// Render a request
    ///
    /// # Errors
    ///
    /// Returns error if the body exceeds `max_body_size`
    pub fn request(&self, request: &Request<Bytes>) -> Result<Vec<u8>> {
        let body = self.body(request.body())?;

        let target = request
            .uri()
            .path_and_query()
            .map_or("/", hyper::http::uri::PathAndQuery::as_str);
        let start = format!(
            "{} {} {}",
            request.method(),
            target,
            version_str(request.version())?
        );

        Ok(assemble(&start, request.headers(), body))
    }

    /// Render a response
    ///
    /// # Errors
    ///
    /// Returns error if the body exceeds `max_body_size`
    pub fn response(&self, response: &Response<Bytes>) -> Result<Vec<u8>> {
        let body = self.body(response.body())?;

        let status = response.status();
        let start = match status.canonical_reason() {
            Some(reason) => format!(
                "{} {} {reason}",
                version_str(response.version())?,
                status.as_u16()
            ),
            None => format!("{} {}", version_str(response.version())?, status.as_u16()),
        };

        Ok(assemble(&start, response.headers(), body))
    }

    /// This renderer as a request rendering function
    pub fn request_fn(self) -> RenderRequestFn {
        Arc::new(move |request: &Request<Bytes>| self.request(request))
    }

    /// This renderer as a response rendering function
    pub fn response_fn(self) -> RenderResponseFn {
        Arc::new(move |response: &Response<Bytes>| self.response(response))
    }

    fn body<'a>(&self, body: &'a Bytes) -> Result<&'a [u8]> {
        if !self.body {
            return Ok(&[]);
        }

        if body.len() > self.max_body_size {
            return Err(WiretapError::DataTooLarge {
                size: body.len(),
                limit: self.max_body_size,
            });
        }

        Ok(&body[..])
    }
}

/// Render a request with the default options
///
/// # Errors
///
/// Returns error if the body exceeds [`DEFAULT_MAX_BODY_SIZE`]
pub fn render_request(request: &Request<Bytes>) -> Result<Vec<u8>> {
    Renderer::default().request(request)
}

/// Render a response with the default options
///
/// # Errors
///
/// Returns error if the body exceeds [`DEFAULT_MAX_BODY_SIZE`]
pub fn render_response(response: &Response<Bytes>) -> Result<Vec<u8>> {
    Renderer::default().response(response)
}

fn version_str(version: Version) -> Result<&'static str> {
    match version {
        Version::HTTP_09 => Ok("HTTP/0.9"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_2 => Ok("HTTP/2.0"),
        Version::HTTP_3 => Ok("HTTP/3.0"),
        other => Err(WiretapError::Render(format!(
            "unsupported HTTP version {other:?}"
        ))),
    }
}

fn assemble(start: &str, headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(start.len() + headers.len() * 32 + body.len() + 4);
    out.extend_from_slice(start.as_bytes());
    out.extend_from_slice(b"\r\n");

    for (name, value) in headers {
        out.extend_from_slice(canonical_name(name.as_str()).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Title-case a header name (`content-type` becomes `Content-Type`)
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;

    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }

    out
}
