//! Single-shot client and the request/response adapter.
//!
//! The adapter bridges caller-facing inputs (method, URL, optional raw path,
//! ordered headers, body) to the wire shapes, with two rules that matter for
//! wire exactness:
//!
//! - an explicit `Host` header is used verbatim as the connection authority,
//!   letting a caller dial one address while claiming another;
//! - an explicit raw path replaces the URL-derived path+query byte-for-byte,
//!   bypassing URL parsing entirely, so intentionally malformed request
//!   lines go out unchanged.

use std::io::Read;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use url::Url;

use crate::base::Error;
use crate::socket::dial::{Destination, Dialer, NetDialer, Scheme};
use crate::socket::pool::ConnectionPool;
use crate::wire::{self, Headers, Status, Version};

/// Caller-facing response shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: Version,
    pub status: Status,
    /// Declared `Content-Length`, -1 when absent (e.g. chunked).
    pub content_length: i64,
    pub headers: Headers,
    /// Body bytes, gzip-decoded when the response declared
    /// `Content-Encoding: gzip`.
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on dial + TLS handshake.
    pub connect_timeout: Option<Duration>,
    /// Bound on one full request/response exchange.
    pub read_timeout: Option<Duration>,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Add a `Host` header derived from the URL when the caller supplied
    /// none.
    pub automatic_host_header: bool,
    /// Compute `Content-Length` from the body when the caller supplied none.
    pub automatic_content_length: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            follow_redirects: true,
            max_redirects: 10,
            automatic_host_header: true,
            automatic_content_length: true,
        }
    }
}

/// Single-shot wire-exact client over a [`ConnectionPool`].
///
/// Each call borrows a pooled connection for one exchange and releases it
/// back once the response has been drained.
pub struct Client<D: Dialer = NetDialer> {
    pool: ConnectionPool<D>,
    options: ClientOptions,
}

impl Client<NetDialer> {
    pub fn new(options: ClientOptions) -> Self {
        Self::with_dialer(options, NetDialer::new())
    }
}

impl Default for Client<NetDialer> {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl<D: Dialer> Client<D> {
    pub fn with_dialer(options: ClientOptions, dialer: D) -> Self {
        Self { pool: ConnectionPool::with_dialer(dialer), options }
    }

    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.do_raw("GET", url, "", &Headers::new(), None).await
    }

    pub async fn head(&self, url: &str) -> Result<Response, Error> {
        self.do_raw("HEAD", url, "", &Headers::new(), None).await
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response, Error> {
        let mut headers = Headers::new();
        headers.append("Content-Type", content_type);
        self.do_raw("POST", url, "", &headers, Some(body.into())).await
    }

    /// Full-control entry point: `raw_path` (when non-empty) replaces the
    /// URL-derived path+query verbatim, headers go out in the given order
    /// and casing.
    pub async fn do_raw(
        &self,
        method: &str,
        url: &str,
        raw_path: &str,
        headers: &Headers,
        body: Option<Bytes>,
    ) -> Result<Response, Error> {
        let mut method = method.to_string();
        let mut url = url.to_string();
        let mut raw_path = raw_path.to_string();
        let mut body = body;
        let mut redirects = 0;

        loop {
            let response =
                self.round_trip(&method, &url, &raw_path, headers, body.clone()).await?;

            if !self.options.follow_redirects
                || !is_redirect(response.status.code)
                || redirects >= self.options.max_redirects
            {
                return Ok(response);
            }
            let Some(location) = response.headers.get("Location") else {
                return Ok(response);
            };

            let base =
                Url::parse(&url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
            url = base
                .join(location)
                .map_err(|e| Error::InvalidUrl(format!("{location}: {e}")))?
                .to_string();

            // 307/308 preserve the method and body; the rest downgrade to a
            // bodyless GET (HEAD stays HEAD).
            if !matches!(response.status.code, 307 | 308)
                && !method.eq_ignore_ascii_case("HEAD")
            {
                method = "GET".to_string();
                body = None;
            }
            // The raw path belongs to the original request line only.
            raw_path.clear();
            redirects += 1;
        }
    }

    async fn round_trip(
        &self,
        method: &str,
        url: &str,
        raw_path: &str,
        headers: &Headers,
        body: Option<Bytes>,
    ) -> Result<Response, Error> {
        let (dest, request) = build_request(method, url, raw_path, headers, body, &self.options)?;
        let mut conn = self.pool.acquire(&dest, self.options.connect_timeout).await?;

        let result = match self.options.read_timeout {
            Some(t) if !t.is_zero() => {
                match tokio::time::timeout(t, conn.do_request(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::ReadTimedOut),
                }
            }
            _ => conn.do_request(&request).await,
        };

        match result {
            Ok(response) => {
                // Body fully drained, so the connection can go straight back.
                self.pool.release(conn)?;
                decode_response(response)
            }
            // A failed exchange leaves the connection in an unknown state;
            // dropping it closes it instead of poisoning the pool.
            Err(e) => Err(e),
        }
    }
}

/// Translate caller inputs into the destination to dial and the wire request
/// to send.
pub(crate) fn build_request(
    method: &str,
    url: &str,
    raw_path: &str,
    headers: &Headers,
    body: Option<Bytes>,
    options: &ClientOptions,
) -> Result<(Destination, wire::Request), Error> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    let scheme = match parsed.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => return Err(Error::InvalidUrl(format!("unsupported scheme {other:?}"))),
    };
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?;

    // URL authority as written, defaulting to port 80; an explicit Host
    // header overrides it verbatim as the dial target.
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => format!("{host}:80"),
    };
    let addr = headers.get("Host").map_or(authority, str::to_string);

    let path = if raw_path.is_empty() {
        let mut path = parsed.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }
        path
    } else {
        raw_path.to_string()
    };

    let mut request = wire::Request::new(method, path);
    request.headers = headers.clone();
    request.automatic_content_length = options.automatic_content_length;
    request.body = body;
    if options.automatic_host_header && !request.headers.contains("Host") {
        let host_value = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        request.headers.append("Host", host_value);
    }

    Ok((Destination::new(scheme, addr), request))
}

/// Response-side adapter: transparent gzip decoding, anything else passes
/// through unchanged.
pub(crate) fn decode_response(response: wire::Response) -> Result<Response, Error> {
    let content_length = response.content_length();
    let gzipped = response
        .headers
        .get("Content-Encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

    let body = if gzipped && !response.body.is_empty() {
        let mut decoded = Vec::new();
        GzDecoder::new(&response.body[..])
            .read_to_end(&mut decoded)
            .map_err(|e| Error::ContentDecoding(e.to_string()))?;
        Bytes::from(decoded)
    } else {
        response.body
    };

    Ok(Response {
        version: response.version,
        status: response.status,
        content_length,
        headers: response.headers,
        body,
    })
}

fn is_redirect(code: u16) -> bool {
    matches!(code, 301 | 302 | 303 | 307 | 308)
}

/// Reconstruct the exact outbound byte sequence for a request without
/// sending it.
///
/// Pure and side-effect free; the output is byte-identical to what
/// [`Client::do_raw`] with default options would transmit, including the
/// automatic `Content-Length` rule and the `Host` header derived from the
/// URL when none is supplied.
pub fn dump_request_raw(
    method: &str,
    url: &str,
    raw_path: &str,
    headers: &Headers,
    body: Option<Bytes>,
) -> Result<Vec<u8>, Error> {
    let (_, request) =
        build_request(method, url, raw_path, headers, body, &ClientOptions::default())?;
    Ok(request.to_bytes())
}
