//! Serial Link to ELM327 Adapters
//!
//! Blocking transport used from the driver thread. Everything that talks to
//! the physical adapter goes through [`SerialTransport`], so the driver can be
//! exercised against [`crate::MockAdapter`] without hardware.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::error::ObdError;

/// Default timeout for a full adapter response
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Per-read timeout on the serial port
const READ_POLL_MS: u64 = 100;

/// Default serial baud rate for ELM327 adapters
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Byte-level operations the driver needs from the serial link
pub trait SerialTransport: Send {
    /// Write all bytes to the adapter
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError>;

    /// Block until `delimiter` is read; returns everything up to and
    /// including it
    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError>;

    /// Like [`read_until`](Self::read_until), but gives up after `timeout`
    /// and returns `None` when the adapter stayed silent
    fn try_read_until(
        &mut self,
        delimiter: u8,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ObdError> {
        let _ = timeout;
        match self.read_until(delimiter) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(ObdError::Timeout(_) | ObdError::AdapterNotResponding) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Discard anything pending in the input and output buffers
    fn reset_buffers(&mut self) -> Result<(), ObdError>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        (**self).write_all(bytes)
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError> {
        (**self).read_until(delimiter)
    }

    fn try_read_until(
        &mut self,
        delimiter: u8,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ObdError> {
        (**self).try_read_until(delimiter, timeout)
    }

    fn reset_buffers(&mut self) -> Result<(), ObdError> {
        (**self).reset_buffers()
    }
}

/// Serial port connection to a physical adapter
pub struct SerialLink {
    /// Serial port device path (e.g., "/dev/ttyUSB0" or "COM3")
    device: String,
    /// Open port handle
    port: Box<dyn SerialPort>,
    /// Bytes read past the last delimiter
    pending: Vec<u8>,
    /// Time allowed for one complete response
    response_timeout: Duration,
}

impl SerialLink {
    /// Open `device` at `baud_rate`
    pub fn open(device: &str, baud_rate: u32) -> Result<Self, ObdError> {
        info!("Opening serial port {} at {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate)
            .timeout(Duration::from_millis(READ_POLL_MS))
            .open()?;

        Ok(Self {
            device: device.to_string(),
            port,
            pending: Vec::with_capacity(256),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
        })
    }

    /// Set the response timeout
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    /// Read up to `delimiter`; `None` once `timeout` passes without one
    fn read_within(
        &mut self,
        delimiter: u8,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ObdError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == delimiter) {
                let rest = self.pending.split_off(pos + 1);
                return Ok(Some(std::mem::replace(&mut self.pending, rest)));
            }

            match self.port.read(&mut chunk) {
                Ok(0) => {
                    return Err(ObdError::SerialError(format!(
                        "{} closed while waiting for a response",
                        self.device
                    )))
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) =>
                {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl SerialTransport for SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError> {
        let timeout = self.response_timeout;
        self.read_within(delimiter, timeout)?
            .ok_or(ObdError::Timeout(timeout.as_millis() as u64))
    }

    fn try_read_until(
        &mut self,
        delimiter: u8,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, ObdError> {
        self.read_within(delimiter, timeout)
    }

    fn reset_buffers(&mut self) -> Result<(), ObdError> {
        debug!("Clearing serial buffers on {}", self.device);
        self.port.clear(ClearBuffer::All)?;
        self.pending.clear();
        Ok(())
    }
}
