//! Minimal HTTP/1.1 test server used by the integration tests.
//!
//! Handlers are pipeline-safe: they keep reading requests off the same
//! connection and answer them in arrival order.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use rawnet::{Destination, Scheme};

pub struct TestServer {
    pub port: u16,
    /// Connections accepted so far.
    pub connections: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn destination(&self) -> Destination {
        Destination::new(Scheme::Http, self.addr())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a server that runs `handler` for every accepted connection. The
/// second handler argument is the zero-based connection index.
pub async fn spawn<F, Fut>(handler: F) -> TestServer
where
    F: Fn(TcpStream, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    // Crate traces show up under --nocapture; only the first caller's
    // subscriber sticks.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    tokio::spawn(async move {
        let handler = Arc::new(handler);
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move { handler(stream, index).await });
        }
    });
    TestServer { port, connections }
}

pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

/// Read one request head plus any Content-Length body. `None` on EOF.
pub async fn read_request<R>(reader: &mut R) -> Option<ParsedRequest>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.ok()?;
    if n == 0 {
        return None;
    }
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        let n = reader.read_line(&mut header).await.ok()?;
        if n == 0 {
            return None;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await.ok()?;
    }
    Some(ParsedRequest { method, path, body })
}

pub fn ok_response(body: &[u8]) -> Vec<u8> {
    let mut out =
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(body);
    out
}

/// Answer every request with a 200 whose body is the request path.
pub async fn echo_paths(stream: TcpStream, _conn: usize) {
    let (rd, mut wr) = stream.into_split();
    let mut rd = BufReader::new(rd);
    while let Some(request) = read_request(&mut rd).await {
        if wr.write_all(&ok_response(request.path.as_bytes())).await.is_err() {
            return;
        }
    }
}

/// Read requests forever, never answering.
pub async fn black_hole(stream: TcpStream, _conn: usize) {
    let (rd, _wr) = stream.into_split();
    let mut rd = BufReader::new(rd);
    while read_request(&mut rd).await.is_some() {}
}
