//! Storage Layer
//!
//! Session logs are a headerless sequence of fixed 20-byte records, appended
//! while a session runs and read back in strict 20-byte strides on replay.

mod record;
mod recorder;
mod replay;

pub use record::{BinaryRecord, PAYLOAD_SIZE, RECORD_SIZE, TIMESTAMP_SIZE};
pub use recorder::{RecordingConfig, SessionRecorder, DEFAULT_FLUSH_THRESHOLD};
pub use replay::ReplayReader;

use obd_protocol::DecodeError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    /// Payload does not fit the fixed record layout
    #[error("Payload of {len} bytes exceeds the {PAYLOAD_SIZE}-byte record field")]
    Encoding { len: usize },
    /// Log ends in the middle of a record
    #[error("Corrupt record at byte {offset}: {len} of {RECORD_SIZE} bytes")]
    CorruptRecord { offset: u64, len: usize },
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Recorder already closed")]
    Closed,
    /// A replayed payload could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
