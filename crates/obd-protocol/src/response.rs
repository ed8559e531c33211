//! Response Decoding
//!
//! Maps a frame's four-character hex prefix (mode + PID) to a value
//! extractor. Frames with an unknown prefix are kept as opaque bytes.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ObdError};
use crate::framer::RawFrame;
use crate::pid::Pid;

/// Length of the response prefix in hex characters
pub const PREFIX_LEN: usize = 4;

/// Unit reported for undecoded responses
pub const RAW_UNIT: &str = "bytes";

/// Status lines the adapter prints instead of data
const ADAPTER_MESSAGES: &[&str] = &[
    "OK",
    "?",
    "NO DATA",
    "SEARCHING...",
    "STOPPED",
    "UNABLE TO CONNECT",
    "BUS INIT: ...ERROR",
    "BUS ERROR",
    "CAN ERROR",
    "DATA ERROR",
    "BUFFER FULL",
];

/// A decoded physical value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ObdValue {
    Integer(i64),
    Rational(f64),
    Opaque(Vec<u8>),
}

impl ObdValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObdValue::Integer(v) => Some(*v as f64),
            ObdValue::Rational(v) => Some(*v),
            ObdValue::Opaque(_) => None,
        }
    }
}

impl fmt::Display for ObdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObdValue::Integer(v) => write!(f, "{}", v),
            ObdValue::Rational(v) => write!(f, "{:.2}", v),
            ObdValue::Opaque(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Which decoder produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Pid(Pid),
    Raw,
}

/// One decoded adapter reply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObdResponse {
    /// Decoder that owns the prefix
    pub kind: ResponseKind,
    /// Normalized frame: prefix followed by payload, spaces removed
    pub data: Vec<u8>,
    /// Capture time, seconds since the Unix epoch
    pub timestamp: f64,
    /// Decoded value
    pub value: ObdValue,
    /// Unit of `value`
    pub unit: &'static str,
}

impl ObdResponse {
    /// Response prefix (mode + PID), e.g. `410C`
    pub fn prefix(&self) -> &[u8] {
        &self.data[..PREFIX_LEN.min(self.data.len())]
    }

    /// Hex bytes after the prefix
    pub fn payload(&self) -> &[u8] {
        &self.data[PREFIX_LEN.min(self.data.len())..]
    }

    /// The decoded PID, `None` for raw responses
    pub fn pid(&self) -> Option<Pid> {
        match self.kind {
            ResponseKind::Pid(pid) => Some(pid),
            ResponseKind::Raw => None,
        }
    }

    /// Display name of the response type
    pub fn name(&self) -> &'static str {
        match self.kind {
            ResponseKind::Pid(pid) => pid.name(),
            ResponseKind::Raw => "Raw response",
        }
    }

    /// Capture time as a UTC datetime
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.timestamp.floor();
        let nanos = ((self.timestamp - secs) * 1e9) as u32;
        DateTime::<Utc>::from_timestamp(secs as i64, nanos)
    }
}

impl fmt::Display for ObdResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = self
            .datetime()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| format!("{:.3}", self.timestamp));
        write!(f, "{}: {} {} @ {}", self.name(), self.value, self.unit, when)
    }
}

/// Decoder for one response prefix
#[derive(Debug, Clone, Copy)]
pub struct PidDecoder {
    /// Response prefix, uppercase hex
    pub prefix: &'static str,
    /// PID reported on decoded responses
    pub pid: Pid,
    /// End of the value field in the normalized frame (hex chars)
    pub value_end: usize,
    /// Formula applied to the value field
    pub formula: fn(u32) -> ObdValue,
}

impl PidDecoder {
    fn key(&self) -> [u8; PREFIX_LEN] {
        prefix_key(self.prefix.as_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<ObdValue, DecodeError> {
        let field = data.get(PREFIX_LEN..self.value_end).ok_or_else(|| DecodeError::TooShort {
            frame: String::from_utf8_lossy(data).into_owned(),
            needed: self.value_end,
            actual: data.len(),
        })?;
        let raw = hex_to_uint(field).ok_or_else(|| DecodeError::InvalidHex {
            frame: String::from_utf8_lossy(data).into_owned(),
        })?;
        Ok((self.formula)(raw))
    }
}

/// The standard decoder table
pub static STANDARD_DECODERS: &[PidDecoder] = &[
    PidDecoder {
        prefix: "4105",
        pid: Pid::CoolantTemp,
        value_end: 6,
        formula: celsius_offset_40,
    },
    PidDecoder {
        prefix: "410C",
        pid: Pid::Rpm,
        value_end: 8,
        formula: quarter_rpm,
    },
    PidDecoder {
        prefix: "410D",
        pid: Pid::Speed,
        value_end: 6,
        formula: unsigned,
    },
    PidDecoder {
        prefix: "4111",
        pid: Pid::ThrottlePosition,
        value_end: 6,
        formula: percent,
    },
    PidDecoder {
        prefix: "414C",
        pid: Pid::CommandedThrottle,
        value_end: 6,
        formula: percent,
    },
];

fn celsius_offset_40(a: u32) -> ObdValue {
    ObdValue::Integer(a as i64 - 40)
}

fn quarter_rpm(ab: u32) -> ObdValue {
    ObdValue::Rational(ab as f64 / 4.0)
}

fn unsigned(a: u32) -> ObdValue {
    ObdValue::Integer(a as i64)
}

fn percent(a: u32) -> ObdValue {
    ObdValue::Rational(a as f64 * 100.0 / 255.0)
}

/// Parse an ASCII hex field. `None` on empty input or non-hex characters.
pub fn hex_to_uint(field: &[u8]) -> Option<u32> {
    if field.is_empty() || field.len() > 8 || !field.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    field
        .iter()
        .try_fold(0u32, |acc, &b| Some((acc << 4) | (b as char).to_digit(16)?))
}

fn prefix_key(prefix: &[u8]) -> [u8; PREFIX_LEN] {
    let mut key = [0u8; PREFIX_LEN];
    for (dst, src) in key.iter_mut().zip(prefix) {
        *dst = src.to_ascii_uppercase();
    }
    key
}

/// Prefix-keyed decoder registry
#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    decoders: HashMap<[u8; PREFIX_LEN], PidDecoder>,
}

impl ResponseDecoder {
    /// Build a registry from a decoder table; duplicate prefixes are rejected
    pub fn new(table: &[PidDecoder]) -> Result<Self, ObdError> {
        let mut decoders = HashMap::with_capacity(table.len());
        for decoder in table {
            if decoders.insert(decoder.key(), *decoder).is_some() {
                return Err(ObdError::DuplicatePrefix(decoder.prefix.to_string()));
            }
        }
        Ok(Self { decoders })
    }

    /// Registry with the five decoded PIDs
    pub fn standard() -> Self {
        Self {
            decoders: STANDARD_DECODERS.iter().map(|d| (d.key(), *d)).collect(),
        }
    }

    /// Number of registered prefixes
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoder is registered
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode one frame captured at `timestamp`
    pub fn decode(&self, frame: &RawFrame, timestamp: f64) -> Result<ObdResponse, DecodeError> {
        self.decode_bytes(frame.as_bytes(), timestamp)
    }

    /// Decode a reply line; embedded spaces are ignored
    pub fn decode_bytes(&self, line: &[u8], timestamp: f64) -> Result<ObdResponse, DecodeError> {
        let data: Vec<u8> = line.iter().copied().filter(|&b| b != b' ').collect();

        if !data.iter().all(u8::is_ascii_hexdigit) {
            let text = String::from_utf8_lossy(line).trim().to_string();
            return Err(if is_adapter_message(&text) {
                DecodeError::AdapterMessage(text)
            } else {
                DecodeError::InvalidHex { frame: text }
            });
        }
        if data.len() < PREFIX_LEN {
            return Err(DecodeError::TooShort {
                frame: String::from_utf8_lossy(&data).into_owned(),
                needed: PREFIX_LEN,
                actual: data.len(),
            });
        }

        match self.decoders.get(&prefix_key(&data[..PREFIX_LEN])) {
            Some(decoder) => {
                let value = decoder.decode(&data)?;
                Ok(ObdResponse {
                    kind: ResponseKind::Pid(decoder.pid),
                    data,
                    timestamp,
                    value,
                    unit: decoder.pid.unit(),
                })
            }
            None => Ok(ObdResponse {
                kind: ResponseKind::Raw,
                value: ObdValue::Opaque(data.clone()),
                data,
                timestamp,
                unit: RAW_UNIT,
            }),
        }
    }
}

fn is_adapter_message(text: &str) -> bool {
    // Banner or echoed AT command
    ADAPTER_MESSAGES.contains(&text)
        || text.starts_with("ELM327")
        || text.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("AT"))
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::standard()
    }
}
