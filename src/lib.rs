//! # rawnet
//!
//! A wire-exact HTTP/1.1 client library for security scanners, fuzzers, and
//! protocol test tools.
//!
//! `rawnet` emits requests with exactly the bytes the caller supplies — no
//! header canonicalization, no path or query rewriting — while still
//! providing the connection-management ergonomics of a normal client:
//! per-destination pooling, timeouts, and HTTP/1.1 request pipelining.
//!
//! ## Features
//!
//! - **Wire exactness**: header order and casing pass through untouched;
//!   a raw path override bypasses URL parsing for intentionally malformed
//!   request lines.
//! - **Connection pooling**: idle connections cached per
//!   (protocol, host:port) destination and reused across single-shot calls.
//! - **Pipelining**: many logical requests multiplexed over a few
//!   persistent connections, with strict per-connection response ordering
//!   and bounded backpressure.
//! - **Permissive TLS**: `https` dials skip certificate verification, the
//!   scanning trade-off; wrap the dialer if you need verification.
//! - **Request dumping**: [`dump_request_raw`] reconstructs the exact
//!   outbound bytes without touching the network.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rawnet::{Client, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(ClientOptions::default());
//!     let response = client.get("http://example.com/").await.unwrap();
//!     println!("status: {}", response.status);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - error definitions
//! - [`wire`] - wire-level request/response shapes and framing
//! - [`socket`] - dialing, transport abstraction, and the connection pool
//! - [`pipeline`] - the pipelined request/response engine
//! - [`client`] - single-shot client and request/response adapter

pub mod base;
pub mod client;
pub mod pipeline;
pub mod socket;
pub mod wire;

pub use base::Error;
pub use client::{dump_request_raw, Client, ClientOptions, Response};
pub use pipeline::{PipelineClient, PipelineOptions};
pub use socket::{BoxedStream, ConnectionPool, Destination, Dialer, NetDialer, PooledConn, Scheme};
pub use wire::Headers;
