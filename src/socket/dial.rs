//! Dialing: plain TCP for `http`, TLS for `https`.
//!
//! Certificate verification is disabled on purpose: this crate targets
//! scanners and protocol test tools that talk to arbitrary, often
//! misconfigured endpoints. Callers needing verification must wrap the
//! dialer.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::base::Error;
use crate::socket::stream::BoxedStream;

/// Wire protocol selecting the transport security layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A (protocol, host:port) pair. The pooling key: two destinations are equal
/// iff their scheme and address string are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub scheme: Scheme,
    pub addr: String,
}

impl Destination {
    pub fn new(scheme: Scheme, addr: impl Into<String>) -> Self {
        Self { scheme, addr: addr.into() }
    }

    /// Host portion of the address, used as the TLS server name.
    pub fn host(&self) -> &str {
        let addr = self.addr.as_str();
        if let Some(rest) = addr.strip_prefix('[') {
            // Bracketed IPv6 literal.
            return rest.split(']').next().unwrap_or(addr);
        }
        addr.rsplit_once(':').map_or(addr, |(host, _)| host)
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.addr)
    }
}

/// Dials a remote HTTP server.
///
/// The pool and the pipelined client are generic over this, which is what
/// makes them testable with fake transports and dial counters.
pub trait Dialer: Send + Sync + 'static {
    /// Open a transport to `dest`. When `timeout` is set it bounds the whole
    /// operation: TCP connect and, for `https`, the TLS handshake share the
    /// one budget.
    fn dial(
        &self,
        dest: &Destination,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<BoxedStream, Error>> + Send;
}

/// The production dialer: `tokio::net::TcpStream`, optionally wrapped in
/// native-tls with verification disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetDialer;

impl NetDialer {
    pub fn new() -> Self {
        Self
    }
}

impl Dialer for NetDialer {
    async fn dial(
        &self,
        dest: &Destination,
        timeout: Option<Duration>,
    ) -> Result<BoxedStream, Error> {
        debug!(scheme = dest.scheme.as_str(), addr = %dest.addr, "dialing");
        match timeout {
            Some(t) if !t.is_zero() => tokio::time::timeout(t, connect(dest))
                .await
                .map_err(|_| Error::ConnectTimedOut)?,
            _ => connect(dest).await,
        }
    }
}

async fn connect(dest: &Destination) -> Result<BoxedStream, Error> {
    let tcp =
        TcpStream::connect(&dest.addr).await.map_err(|e| Error::Dial(e.to_string()))?;
    match dest.scheme {
        Scheme::Http => Ok(Box::new(tcp)),
        Scheme::Https => {
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| Error::Tls(e.to_string()))?;
            let connector = tokio_native_tls::TlsConnector::from(connector);
            let stream = connector
                .connect(dest.host(), tcp)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            Ok(Box::new(stream))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_equality_is_scheme_and_addr() {
        let a = Destination::new(Scheme::Http, "example.com:80");
        let b = Destination::new(Scheme::Http, "example.com:80");
        let c = Destination::new(Scheme::Https, "example.com:80");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_host_strips_port() {
        assert_eq!(Destination::new(Scheme::Http, "example.com:8080").host(), "example.com");
        assert_eq!(Destination::new(Scheme::Http, "example.com").host(), "example.com");
        assert_eq!(Destination::new(Scheme::Http, "[::1]:8080").host(), "::1");
    }

    #[test]
    fn test_display() {
        let d = Destination::new(Scheme::Https, "target:8443");
        assert_eq!(d.to_string(), "https://target:8443");
    }
}
