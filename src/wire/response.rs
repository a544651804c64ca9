use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::base::Error;
use crate::wire::{Headers, Version};

/// Response status line, minus the version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: String,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// A parsed response with its body fully drained off the wire.
///
/// Draining is not an optimization shortcut: on a pipelined connection the
/// next response cannot be located until this one's body has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: Version,
    pub status: Status,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Declared `Content-Length`, Go-style: -1 when absent or unparsable
    /// (e.g. chunked responses).
    pub fn content_length(&self) -> i64 {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(-1)
    }
}

/// Read exactly one response from `reader`.
///
/// `skip_body` is for HEAD exchanges, where headers may advertise a body
/// that the server will not send. Body framing is `Content-Length`, chunked
/// (trailers consumed and discarded), or empty when neither is declared;
/// responses that can carry no body (1xx, 204, 304) are never read past
/// their headers.
pub async fn read_response<R>(reader: &mut R, skip_body: bool) -> Result<Response, Error>
where
    R: AsyncBufRead + Unpin,
{
    let status_line = match read_line(reader).await? {
        Some(line) => line,
        None => return Err(Error::ConnectionClosed),
    };

    let (version, status) = parse_status_line(&status_line)?;

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| Error::Read("unexpected eof in headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedResponse(format!("header line {:?}", line)))?;
        headers.append(name, value.trim_start_matches([' ', '\t']));
    }

    let bodyless = skip_body
        || status.code < 200
        || status.code == 204
        || status.code == 304;

    let body = if bodyless {
        Bytes::new()
    } else if is_chunked(&headers) {
        read_chunked_body(reader).await?
    } else if let Some(value) = headers.get("Content-Length") {
        let len: usize = value
            .trim()
            .parse()
            .map_err(|_| Error::MalformedResponse(format!("content-length {:?}", value)))?;
        let mut buf = vec![0u8; len];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::Read(e.to_string()))?;
        Bytes::from(buf)
    } else {
        // No framing declared. Responses delimited by connection close are
        // unusable under pipelining, so they are treated as empty.
        Bytes::new()
    };

    Ok(Response { version, status, headers, body })
}

fn parse_status_line(line: &str) -> Result<(Version, Status), Error> {
    let mut parts = line.splitn(3, ' ');
    let version_token = parts.next().unwrap_or_default();
    let version = Version::parse(version_token)
        .ok_or_else(|| Error::MalformedResponse(format!("status line {:?}", line)))?;
    let code = parts
        .next()
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| Error::MalformedResponse(format!("status line {:?}", line)))?;
    let reason = parts.next().unwrap_or_default().to_string();
    Ok((version, Status { code, reason }))
}

fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("Transfer-Encoding")
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
}

async fn read_chunked_body<R>(reader: &mut R) -> Result<Bytes, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let line = read_line(reader).await?.ok_or(Error::InvalidChunkedEncoding)?;
        // Chunk extensions after ';' are ignored.
        let size_token = line.split(';').next().unwrap_or_default().trim();
        let size =
            usize::from_str_radix(size_token, 16).map_err(|_| Error::InvalidChunkedEncoding)?;
        if size == 0 {
            // Trailer section: lines up to and including the blank line.
            loop {
                match read_line(reader).await? {
                    Some(l) if l.is_empty() => return Ok(Bytes::from(body)),
                    Some(_) => continue,
                    None => return Err(Error::InvalidChunkedEncoding),
                }
            }
        }
        let start = body.len();
        body.resize(start + size, 0);
        reader
            .read_exact(&mut body[start..])
            .await
            .map_err(|e| Error::Read(e.to_string()))?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await.map_err(|e| Error::Read(e.to_string()))?;
        if &crlf != b"\r\n" {
            return Err(Error::InvalidChunkedEncoding);
        }
    }
}

/// One CRLF-terminated line, without its terminator. `None` means a clean
/// EOF before any byte was read.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf).await.map_err(|e| Error::Read(e.to_string()))?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| Error::MalformedResponse("non-utf8 header data".to_string()))
}
