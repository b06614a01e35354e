//! In-memory response recording and replay
//!
//! A handler writes into a [`Recorder`] (collect), the result is taken with
//! [`Recorder::finish`], and [`replay`] copies it onto another
//! [`ResponseWriter`] (commit).

use std::io;

use bytes::{Bytes, BytesMut};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE, TRANSFER_ENCODING};
use hyper::{Response, StatusCode};

use crate::handler::ResponseWriter;

/// Response writer that keeps everything in memory
#[derive(Debug, Default)]
pub struct Recorder {
    headers: HeaderMap,
    status: Option<StatusCode>,
    snapshot: Option<HeaderMap>,
    body: BytesMut,
}

impl Recorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Status written so far, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Body written so far
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finalize into a response
    ///
    /// Status defaults to `200 OK`. Headers are those present when the status
    /// was written, or the current headers if it never was.
    pub fn finish(self) -> Response<Bytes> {
        let status = self.status.unwrap_or(StatusCode::OK);
        let headers = self.snapshot.unwrap_or(self.headers);

        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn commit(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.snapshot = Some(self.headers.clone());
    }
}

impl ResponseWriter for Recorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.commit(status);
    }

    fn write_body(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.status.is_none() {
            if !self.headers.contains_key(CONTENT_TYPE)
                && !self.headers.contains_key(TRANSFER_ENCODING)
            {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(sniff(buf)));
            }
            self.commit(StatusCode::OK);
        }

        self.body.extend_from_slice(buf);
        Ok(())
    }
}

/// Copy a recorded response onto `writer`
///
/// Headers go first: each recorded name replaces whatever `writer` already
/// holds under that name, keeping every recorded value in order. Then the
/// status, then the body.
///
/// # Errors
///
/// Returns error if `writer` rejects the body
pub fn replay(response: &Response<Bytes>, writer: &mut dyn ResponseWriter) -> io::Result<()> {
    let source = response.headers();
    let destination = writer.headers_mut();

    for name in source.keys() {
        destination.remove(name);
        for value in source.get_all(name) {
            destination.append(name.clone(), value.clone());
        }
    }

    writer.write_status(response.status());

    if !response.body().is_empty() {
        writer.write_body(response.body())?;
    }

    Ok(())
}

const HTML_PREFIXES: [&[u8]; 5] = [b"<!doctype html", b"<html", b"<head", b"<body", b"<!--"];

/// Guess a content type from the first bytes of a body
pub fn sniff(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(512)];
    let trimmed = trim_leading_whitespace(head);

    for prefix in HTML_PREFIXES {
        if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
            return "text/html; charset=utf-8";
        }
    }

    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if head.iter().any(|&b| is_binary(b)) {
        return "application/octet-stream";
    }

    "text/plain; charset=utf-8"
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}
