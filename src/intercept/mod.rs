//! Dumping interceptors
//!
//! [`OutboundInterceptor`] wraps a client [`Transport`](crate::transport::Transport);
//! [`InboundInterceptor`] wraps a server [`Handler`](crate::handler::Handler).
//! Both render with [`dump`](crate::dump) and print through a [`Sink`](crate::Sink).

mod inbound;
mod outbound;

pub use inbound::InboundInterceptor;
pub use outbound::OutboundInterceptor;
