//! Wicket - embeddable HTTP/1.x server engine
//!
//! Incremental request parsing, first-match routing and response framing
//! with streamed bodies.

pub mod config;
pub mod http;
pub mod router;
pub mod server;
