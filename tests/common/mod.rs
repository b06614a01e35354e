//! Shared helpers for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use hyper::Request;
use wiretap::handler::ResponseWriter;

/// Writes `hello` with an implicit 200
pub fn hello(writer: &mut dyn ResponseWriter, _request: &Request<Bytes>) {
    writer.write_body(b"hello").unwrap();
}

/// Make captured dumps comparable across runs
///
/// Masks `Date:` and `Host:` values, turns CRLF into LF and collapses runs
/// of blank lines into one.
pub fn normalize(dump: &str) -> String {
    let masked: Vec<String> = dump
        .replace("\r\n", "\n")
        .split('\n')
        .map(|line| {
            if line.starts_with("Date: ") {
                "Date: <DATE>".to_string()
            } else if line.starts_with("Host: ") {
                "Host: <HOST>".to_string()
            } else {
                line.to_string()
            }
        })
        .collect();

    let mut out = masked.join("\n");
    while out.contains("\n\n\n") {
        out = out.replace("\n\n\n", "\n\n");
    }
    out
}
