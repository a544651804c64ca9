use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Variants carry only what tests and callers need to branch on; all of them
/// are `Clone + PartialEq` so a slot can hand the same error to every request
/// it owned when a connection dies mid-pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("connect timed out")]
    ConnectTimedOut,
    #[error("write failed: {0}")]
    Write(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("connection closed")]
    ConnectionClosed,

    // Capacity errors
    #[error("too many pending requests")]
    PipelineOverflow,

    // Timeout errors
    #[error("response read timed out")]
    ReadTimedOut,

    // Protocol/framing errors
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("content decoding failed: {0}")]
    ContentDecoding(String),

    // Caller-usage errors
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("connection was not checked out from this pool")]
    ForeignConnection,
}

impl Error {
    /// True for errors raised by the transport itself rather than by
    /// protocol content or caller misuse.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Dial(_)
                | Error::Tls(_)
                | Error::ConnectTimedOut
                | Error::Write(_)
                | Error::Read(_)
                | Error::ConnectionClosed
        )
    }
}
