//! ELM327 Emulator
//!
//! In-memory stand-in for a physical adapter. Answers the AT handshake and the
//! decoded PIDs with synthetic values so the whole pipeline can run without
//! hardware.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::error::ObdError;
use crate::framer::DELIMITER;
use crate::transport::SerialTransport;

/// Emulated ELM327 adapter
#[derive(Debug)]
pub struct MockAdapter {
    /// Bytes waiting to be read by the host
    output: VecDeque<u8>,
    /// Partial command line
    input: Vec<u8>,
    /// Echo commands back (ATE1)
    echo: bool,
    /// Sample counter driving the synthetic values
    counter: u64,
    /// Scripted replies, consumed in order before falling back to synthetic ones
    scripted: HashMap<String, VecDeque<String>>,
    /// Every command received, shared with the test that built the adapter
    log: Arc<Mutex<Vec<String>>>,
    /// Fail writes once this many PID commands were answered
    disconnect_after: Option<u64>,
    /// PID commands answered so far
    answered: u64,
    /// Simulated adapter response time
    latency: Option<Duration>,
}

impl MockAdapter {
    /// Create an adapter in its power-on state
    pub fn new() -> Self {
        debug!("Creating mock ELM327 adapter");
        Self {
            output: VecDeque::new(),
            input: Vec::new(),
            echo: true,
            counter: 0,
            scripted: HashMap::new(),
            log: Arc::new(Mutex::new(Vec::new())),
            disconnect_after: None,
            answered: 0,
            latency: None,
        }
    }

    /// Queue a literal reply for the next occurrence of `command`
    pub fn script(mut self, command: &str, reply: &str) -> Self {
        self.scripted
            .entry(command.to_ascii_uppercase())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Drop the link after `commands` PID commands were answered
    pub fn disconnect_after(mut self, commands: u64) -> Self {
        self.disconnect_after = Some(commands);
        self
    }

    /// Delay every response read by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Handle to the log of received commands
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    fn handle_command(&mut self, command: &str) -> Result<(), ObdError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(command.to_string());
        }

        let is_pid = !command.is_empty() && !command.starts_with("AT");
        if is_pid {
            if let Some(limit) = self.disconnect_after {
                if self.answered >= limit {
                    return Err(ObdError::SerialError("mock adapter disconnected".to_string()));
                }
            }
            self.answered += 1;
        }

        let reply = match self.scripted.get_mut(command).and_then(VecDeque::pop_front) {
            Some(reply) => reply,
            None => self.synthetic_reply(command),
        };
        self.output.extend(reply.as_bytes());
        Ok(())
    }

    fn synthetic_reply(&mut self, command: &str) -> String {
        self.counter += 1;
        let n = self.counter;

        match command {
            "" => ">".to_string(),
            "ATZ" => {
                self.echo = true;
                "\r\rELM327 v1.5\r\r>".to_string()
            }
            "ATE0" => {
                self.echo = false;
                "OK\r\r>".to_string()
            }
            "ATE1" => {
                self.echo = true;
                "OK\r\r>".to_string()
            }
            c if c.starts_with("AT") => "OK\r\r>".to_string(),
            // RPM: 800-3500
            "010C" => {
                let raw = (800 + (n * 37) % 2700) * 4;
                format!("41 0C {:02X} {:02X} \r\r>", raw >> 8, raw & 0xFF)
            }
            // Speed: 0-119 km/h
            "010D" => format!("41 0D {:02X} \r\r>", n % 120),
            // Coolant: 70-104 °C
            "0105" => format!("41 05 {:02X} \r\r>", 110 + n % 35),
            "0111" => format!("41 11 {:02X} \r\r>", (n * 13) % 256),
            "014C" => format!("41 4C {:02X} \r\r>", (n * 11) % 256),
            c if c.starts_with("01") => "NO DATA\r\r>".to_string(),
            _ => "?\r\r>".to_string(),
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport for MockAdapter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        for &b in bytes {
            if self.echo {
                self.output.push_back(b);
            }
            match b {
                DELIMITER => {
                    let line = String::from_utf8_lossy(&self.input).trim().to_ascii_uppercase();
                    self.input.clear();
                    self.handle_command(&line)?;
                }
                b'\n' => {}
                _ => self.input.push(b),
            }
        }
        Ok(())
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        match self.output.iter().position(|&b| b == delimiter) {
            Some(pos) => Ok(self.output.drain(..=pos).collect()),
            None => Err(ObdError::AdapterNotResponding),
        }
    }

    fn reset_buffers(&mut self) -> Result<(), ObdError> {
        self.output.clear();
        self.input.clear();
        Ok(())
    }
}
