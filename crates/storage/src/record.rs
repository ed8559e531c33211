//! Binary Record Codec
//!
//! Layout, little-endian:
//!
//! | bytes  | field                                          |
//! |--------|------------------------------------------------|
//! | 0..4   | timestamp, `f32` seconds since the Unix epoch  |
//! | 4..20  | payload, NUL-padded on the left                |
//!
//! The payload is the normalized ASCII frame (prefix and data bytes, spaces
//! removed), so replay can feed it straight back into the decoder.

use obd_protocol::{DecodeError, ObdResponse, ResponseDecoder};

use crate::StorageError;

/// Bytes per record on disk
pub const RECORD_SIZE: usize = TIMESTAMP_SIZE + PAYLOAD_SIZE;
/// Timestamp field width
pub const TIMESTAMP_SIZE: usize = 4;
/// Payload field width
pub const PAYLOAD_SIZE: usize = 16;

/// One `(timestamp, payload)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryRecord {
    timestamp: f32,
    payload: Vec<u8>,
}

impl BinaryRecord {
    /// Build a record; payloads longer than [`PAYLOAD_SIZE`] are rejected
    pub fn new(timestamp: f32, payload: impl Into<Vec<u8>>) -> Result<Self, StorageError> {
        let payload = payload.into();
        if payload.len() > PAYLOAD_SIZE {
            return Err(StorageError::Encoding { len: payload.len() });
        }
        Ok(Self { timestamp, payload })
    }

    /// Record for a decoded response
    pub fn from_response(response: &ObdResponse) -> Result<Self, StorageError> {
        Self::new(response.timestamp as f32, response.data.as_slice())
    }

    pub fn timestamp(&self) -> f32 {
        self.timestamp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        bytes[..TIMESTAMP_SIZE].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[RECORD_SIZE - self.payload.len()..].copy_from_slice(&self.payload);
        bytes
    }

    /// Parse the on-disk layout, stripping the NUL padding
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut timestamp = [0u8; TIMESTAMP_SIZE];
        timestamp.copy_from_slice(&bytes[..TIMESTAMP_SIZE]);

        let field = &bytes[TIMESTAMP_SIZE..];
        let start = field.iter().position(|&b| b != 0).unwrap_or(field.len());

        Self {
            timestamp: f32::from_le_bytes(timestamp),
            payload: field[start..].to_vec(),
        }
    }

    /// Re-run the decoder on the stored payload
    pub fn to_response(&self, decoder: &ResponseDecoder) -> Result<ObdResponse, DecodeError> {
        decoder.decode_bytes(&self.payload, f64::from(self.timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{ObdValue, Pid};
    use proptest::prelude::*;

    #[test]
    fn test_layout() {
        let record = BinaryRecord::new(1.5, b"410C0320".to_vec()).unwrap();
        let bytes = record.encode();

        assert_eq!(&bytes[..4], &1.5f32.to_le_bytes());
        assert_eq!(&bytes[4..12], &[0u8; 8]);
        assert_eq!(&bytes[12..], b"410C0320");
    }

    #[test]
    fn test_payload_boundary() {
        let full = b"0123456789ABCDEF".to_vec();
        let record = BinaryRecord::new(2.0, full.clone()).unwrap();
        assert_eq!(BinaryRecord::decode(&record.encode()).payload(), full.as_slice());

        let err = BinaryRecord::new(2.0, b"0123456789ABCDEF0".to_vec()).unwrap_err();
        assert_eq!(err, StorageError::Encoding { len: 17 });
    }

    #[test]
    fn test_replayed_payload_decodes_again() {
        let decoder = ResponseDecoder::standard();
        let live = decoder.decode_bytes(b"41 0C 03 20", 1024.0).unwrap();

        let record = BinaryRecord::from_response(&live).unwrap();
        assert_eq!(record.payload(), b"410C0320");

        let replayed = BinaryRecord::decode(&record.encode()).to_response(&decoder).unwrap();
        assert_eq!(replayed.pid(), Some(Pid::Rpm));
        assert_eq!(replayed.value, ObdValue::Rational(200.0));
        assert_eq!(replayed.prefix(), live.prefix());
        assert_eq!(replayed.payload(), live.payload());
        assert_eq!(replayed.timestamp, 1024.0);
    }

    #[test]
    fn test_empty_payload() {
        let record = BinaryRecord::new(0.25, Vec::new()).unwrap();
        assert_eq!(BinaryRecord::decode(&record.encode()), record);
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            timestamp in any::<f32>().prop_filter("NaN never compares equal", |t| !t.is_nan()),
            first in 1u8..=255,
            rest in proptest::collection::vec(any::<u8>(), 0..PAYLOAD_SIZE),
        ) {
            let mut payload = vec![first];
            payload.extend(rest);

            let record = BinaryRecord::new(timestamp, payload).unwrap();
            let decoded = BinaryRecord::decode(&record.encode());
            prop_assert_eq!(decoded.timestamp().to_bits(), timestamp.to_bits());
            prop_assert_eq!(decoded.payload(), record.payload());
        }
    }
}
