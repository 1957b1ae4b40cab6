use crate::types::ErrorCode;

/// The error taxonomy of spec.md §7. Transport and connection-protocol
/// errors are fatal to the whole connection; stream errors only fail the
/// stream's associated command; command errors (timeout, bad input) only
/// affect the issuing command.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Http2Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("Server does not support HTTP/2 protocol.")]
    AlpnMismatch,

    #[error("connection error {}: {1}", .0.name())]
    Protocol(ErrorCode, String),

    #[error("stream error {}: {1}", .0.name())]
    Stream(ErrorCode, String),

    #[error("Timeout after {0} seconds.")]
    Timeout(u64),

    #[error("Not connected. Run 'connect' first.")]
    NotConnected,

    #[error("{0}")]
    InvalidInput(String),
}

impl Http2Error {
    pub fn protocol(code: ErrorCode, message: impl Into<String>) -> Self {
        Http2Error::Protocol(code, message.into())
    }

    pub fn stream(code: ErrorCode, message: impl Into<String>) -> Self {
        Http2Error::Stream(code, message.into())
    }

    /// The GOAWAY error code to send when this error reaches the event
    /// loop as a fatal connection failure, or `None` when the connection
    /// is already unusable and GOAWAY cannot meaningfully be sent (spec.md
    /// §7: transport errors are simply fatal, no GOAWAY is attempted).
    pub fn connection_error_code(&self) -> Option<ErrorCode> {
        match self {
            Http2Error::Protocol(code, _) => Some(*code),
            Http2Error::Transport(_) | Http2Error::AlpnMismatch => None,
            Http2Error::Stream(..) | Http2Error::Timeout(_) | Http2Error::NotConnected | Http2Error::InvalidInput(_) => None,
        }
    }
}

impl From<std::io::Error> for Http2Error {
    fn from(err: std::io::Error) -> Self {
        Http2Error::Transport(err.to_string())
    }
}
