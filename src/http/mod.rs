//! HTTP/1.x protocol engine.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection loop tying the pieces below together
//! - **`parser`**: incremental request parser, fed bytes as they arrive
//! - **`chunked`**: chunked transfer-coding decoder embedded in the parser
//! - **`headers`**: request and response header tables
//! - **`request`**: parsed request representation
//! - **`response`**: status codes and response values
//! - **`writer`**: frames responses into the connection's outbound buffer
//! - **`copier`**: streams response bodies from a reader with backpressure
//! - **`mime`**: content-type tokens and inference
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Feed bytes to the parser
//!        └──────┬──────┘
//!               │ Request complete
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatching    │ ← Router runs the handler (or 404)
//!        └──────┬───────────┘
//!               │ Response framed
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Flush head/body, then stream body if any
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (leftover bytes first)
//!               └─ Close → Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wicket::config::ServerConfig;
//! use wicket::http::connection::Connection;
//! use wicket::router::Router;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let router = Arc::new(Router::new());
//!     let config = ServerConfig::default();
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let mut conn = Connection::new(socket, router.clone(), &config);
//!         tokio::spawn(async move {
//!             if let Err(e) = conn.run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod chunked;
pub mod connection;
pub mod copier;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
