//! Log Replay

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use obd_protocol::{ObdResponse, ResponseDecoder};
use tracing::{info, warn};

use crate::record::{BinaryRecord, RECORD_SIZE};
use crate::StorageError;

/// Reads a log back in strict 20-byte strides.
///
/// A truncated tail yields one `CorruptRecord` error and ends the iteration;
/// records before it stay valid.
pub struct ReplayReader<R> {
    reader: R,
    offset: u64,
    done: bool,
}

impl ReplayReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!("Replaying {}", path.display());
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: Read> ReplayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            done: false,
        }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Decode every record again with `decoder`
    pub fn responses<'a>(
        self,
        decoder: &'a ResponseDecoder,
    ) -> impl Iterator<Item = Result<ObdResponse, StorageError>> + 'a
    where
        R: 'a,
    {
        self.map(move |record| Ok(record?.to_response(decoder)?))
    }
}

impl<R: Read> Iterator for ReplayReader<R> {
    type Item = Result<BinaryRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut bytes = [0u8; RECORD_SIZE];
        match read_full(&mut self.reader, &mut bytes) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(RECORD_SIZE) => {
                self.offset += RECORD_SIZE as u64;
                Some(Ok(BinaryRecord::decode(&bytes)))
            }
            Ok(len) => {
                self.done = true;
                warn!("Log truncated at byte {} ({} trailing bytes)", self.offset, len);
                Some(Err(StorageError::CorruptRecord {
                    offset: self.offset,
                    len,
                }))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

/// Fill `buf` unless the reader ends first; returns the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
