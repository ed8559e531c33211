//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur while talking to an ELM327 adapter
#[derive(Debug, Clone, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for the adapter prompt
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Adapter stopped answering (no prompt pending)
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// The consumer side of the response channel went away
    #[error("Response channel closed")]
    ChannelClosed,

    /// Two decoders registered for the same response prefix
    #[error("Duplicate decoder registered for response prefix {0}")]
    DuplicatePrefix(String),

    /// A single frame could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ObdError {
    /// Whether this error comes from the serial link and ends the session
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ObdError::SerialError(_) | ObdError::Timeout(_) | ObdError::AdapterNotResponding
        )
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

/// Errors for a single adapter frame. Never fatal to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame has fewer hex characters than its decoder needs
    #[error("Frame {frame:?} too short: need {needed} hex chars, got {actual}")]
    TooShort {
        frame: String,
        needed: usize,
        actual: usize,
    },

    /// Frame contains characters outside 0-9A-F
    #[error("Frame {frame:?} contains non-hex characters")]
    InvalidHex { frame: String },

    /// Status text from the adapter itself (OK, NO DATA, SEARCHING...)
    #[error("Adapter message {0:?}")]
    AdapterMessage(String),
}

impl DecodeError {
    /// Raw frame text the error refers to
    pub fn frame(&self) -> &str {
        match self {
            DecodeError::TooShort { frame, .. } => frame,
            DecodeError::InvalidHex { frame } => frame,
            DecodeError::AdapterMessage(frame) => frame,
        }
    }
}
