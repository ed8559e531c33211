//! Session Recorder
//!
//! Buffers encoded records in memory and appends them to the sink once the
//! buffer grows past the flush threshold, and again on close.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use obd_protocol::{ObdResponse, ResponseObserver};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{BinaryRecord, RECORD_SIZE};
use crate::StorageError;

/// Records buffered before a flush is forced
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// Upper bound on the buffer reserved up front; larger thresholds grow on demand
const MAX_PREALLOCATED_RECORDS: usize = 4096;

/// Recording configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Log file, replaced at the start of each session
    pub path: PathBuf,
    /// Buffered records that trigger a flush
    pub flush_threshold: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.obd"),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// Buffered writer of [`BinaryRecord`]s
pub struct SessionRecorder<W: Write> {
    sink: Option<W>,
    buffer: Vec<u8>,
    buffered: usize,
    flush_threshold: usize,
    written: u64,
    dropped: u64,
}

impl SessionRecorder<BufWriter<std::fs::File>> {
    /// Create `path`, truncating a log left by an earlier session
    pub fn create(path: impl AsRef<Path>, flush_threshold: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        info!("Recording to {}", path.display());
        Ok(Self::new(BufWriter::new(file), flush_threshold))
    }

    /// Open the file named by `config`
    pub fn from_config(config: &RecordingConfig) -> Result<Self, StorageError> {
        Self::create(&config.path, config.flush_threshold)
    }
}

impl<W: Write> SessionRecorder<W> {
    /// Record into any byte sink
    pub fn new(sink: W, flush_threshold: usize) -> Self {
        Self {
            sink: Some(sink),
            buffer: Vec::with_capacity(
                flush_threshold.min(MAX_PREALLOCATED_RECORDS).saturating_add(1) * RECORD_SIZE,
            ),
            buffered: 0,
            flush_threshold,
            written: 0,
            dropped: 0,
        }
    }

    /// Buffer one record, flushing once the buffer passes the threshold
    pub fn record(&mut self, record: &BinaryRecord) -> Result<(), StorageError> {
        if self.sink.is_none() {
            return Err(StorageError::Closed);
        }
        self.buffer.extend_from_slice(&record.encode());
        self.buffered += 1;

        if self.buffered > self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Encode and buffer a decoded response.
    ///
    /// An oversized payload drops only this record.
    pub fn record_response(&mut self, response: &ObdResponse) -> Result<(), StorageError> {
        match BinaryRecord::from_response(response) {
            Ok(record) => self.record(&record),
            Err(e) => {
                self.dropped += 1;
                Err(e)
            }
        }
    }

    /// Write all buffered records to the sink
    pub fn flush(&mut self) -> Result<(), StorageError> {
        let sink = self.sink.as_mut().ok_or(StorageError::Closed)?;
        if self.buffered == 0 {
            return Ok(());
        }

        let count = self.buffered;
        let result = sink.write_all(&self.buffer).and_then(|()| sink.flush());
        self.buffer.clear();
        self.buffered = 0;

        match result {
            Ok(()) => {
                self.written += count as u64;
                debug!("Flushed {} records", count);
                Ok(())
            }
            Err(e) => {
                self.dropped += count as u64;
                Err(e.into())
            }
        }
    }

    /// Flush and release the sink. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if self.sink.is_none() {
            return Ok(());
        }
        let result = self.flush();
        self.sink = None;
        info!(
            "Recorder closed: {} records written, {} dropped",
            self.written, self.dropped
        );
        result
    }

    /// Flush and hand back the sink
    pub fn into_inner(mut self) -> Result<W, StorageError> {
        self.flush()?;
        self.sink.take().ok_or(StorageError::Closed)
    }

    /// Records waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Records that reached the sink
    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Records lost to encoding or sink errors
    pub fn records_dropped(&self) -> u64 {
        self.dropped
    }
}

impl<W: Write> Drop for SessionRecorder<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close recorder: {}", e);
        }
    }
}

impl<W: Write> ResponseObserver for SessionRecorder<W> {
    fn on_response(&mut self, response: &ObdResponse) {
        if let Err(e) = self.record_response(response) {
            warn!("Dropping record for {}: {}", response.name(), e);
        }
    }
}
