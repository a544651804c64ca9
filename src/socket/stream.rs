//! Transport polymorphism.
//!
//! A dialed connection is either plain TCP or TLS over TCP, and tests swap in
//! in-memory pipes. All of them are handled uniformly as a boxed
//! [`Transport`].

use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

/// An open transport connection, type-erased.
pub type BoxedStream = Box<dyn Transport>;
