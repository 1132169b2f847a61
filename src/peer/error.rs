use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be serialized or parsed as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A piece payload was not valid base64.
    #[error("invalid piece payload: {0}")]
    InvalidPayload(String),

    /// A line exceeded the frame limit without a terminating newline.
    #[error("line too long: {0} bytes")]
    LineTooLong(usize),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,
}
