//! Wiretap - HTTP request/response dumping for clients and servers
//!
//! Wraps a client [`Transport`](transport::Transport) or a server
//! [`Handler`](handler::Handler) so that every request and response passing
//! through is written, in wire format, to a text sink.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod client;
pub mod config;
pub mod dump;
pub mod error;
pub mod handler;
pub mod intercept;
pub mod recorder;
pub mod server;
pub mod sink;
pub mod transport;

pub use error::{Result, WiretapError};
pub use intercept::{InboundInterceptor, OutboundInterceptor};
pub use sink::Sink;
