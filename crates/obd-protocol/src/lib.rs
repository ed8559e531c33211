//! OBD-II Protocol Implementation
//!
//! Framing, decoding and serial transport for ELM327-compatible OBD-II
//! adapters. The adapter is driven with AT commands over a serial link and
//! answers with carriage-return terminated lines followed by a `>` prompt.

mod error;
mod framer;
mod mock;
mod observer;
mod pid;
mod protocol;
mod response;
mod transport;

pub use error::{DecodeError, ObdError};
pub use framer::{split, FrameSplitter, RawFrame, Split, DELIMITER, PROMPT};
pub use mock::MockAdapter;
pub use observer::ResponseObserver;
pub use pid::Pid;
pub use protocol::{ObdProtocol, AT_ECHO_OFF, AT_RESET};
pub use response::{
    hex_to_uint, ObdResponse, ObdValue, PidDecoder, ResponseDecoder, ResponseKind, PREFIX_LEN,
    RAW_UNIT, STANDARD_DECODERS,
};
pub use transport::{
    SerialLink, SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_RESPONSE_TIMEOUT_MS,
};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Added to the request mode in positive responses
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
