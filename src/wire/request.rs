use bytes::Bytes;

use crate::wire::{Headers, Version};

/// A request in its wire shape: the bytes produced by [`Request::to_bytes`]
/// are exactly what goes on the connection, with no header canonicalization
/// and no path rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request-target, already including any query string. Emitted verbatim.
    pub path: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Option<Bytes>,
    /// When true and the caller did not supply a `Content-Length` header,
    /// one is computed from the body and emitted after the caller's headers.
    pub automatic_content_length: bool,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            version: Version::Http11,
            headers: Headers::new(),
            body: None,
            automatic_content_length: true,
        }
    }

    /// Body length when determinable. `None` means the caller left framing
    /// to its own headers.
    pub fn content_length(&self) -> Option<usize> {
        self.body.as_ref().map(|b| b.len())
    }

    /// Serialize the request exactly as transmitted: request line, headers
    /// in insertion order as `Name:value`, the computed `Content-Length`
    /// (when applicable), a blank line, then the body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.body.as_ref().map_or(0, |b| b.len()));
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.path.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.version.as_str().as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.push(b':');
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if self.automatic_content_length && !self.headers.contains("Content-Length") {
            if let Some(len) = self.content_length() {
                out.extend_from_slice(format!("Content-Length: {}\r\n", len).as_bytes());
            }
        }

        out.extend_from_slice(b"\r\n");

        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }

        out
    }
}
