//! Adapter Driver
//!
//! Blocking producer loop. Runs the AT handshake, then writes one command at
//! a time and reads until the adapter prompt before sending the next, handing
//! every byte read to the sink.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use obd_protocol::{ObdError, ObdProtocol, SerialTransport, DELIMITER, PROMPT};
use tracing::{debug, error, info, trace};

use crate::schedule::CommandSchedule;

/// Time allowed for each further handshake prompt once the first arrived
const HANDSHAKE_GRACE_MS: u64 = 1000;

/// Driver lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Initializing,
    Ready,
    Cycling { command_index: usize },
    /// Unrecoverable transport error
    Failed,
}

/// Drives an ELM327 adapter through its command schedule
pub struct AdapterDriver<T> {
    transport: T,
    schedule: CommandSchedule,
    protocol: ObdProtocol,
    state: DriverState,
    stop: Arc<AtomicBool>,
    commands_sent: u64,
}

impl<T: SerialTransport> AdapterDriver<T> {
    /// Create a driver for an already opened transport
    pub fn new(transport: T, schedule: CommandSchedule, protocol: ObdProtocol) -> Self {
        Self {
            transport,
            schedule,
            protocol,
            state: DriverState::Disconnected,
            stop: Arc::new(AtomicBool::new(false)),
            commands_sent: 0,
        }
    }

    /// Flag checked between commands; setting it ends [`AdapterDriver::run`]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Commands written since the handshake
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    /// Reset the link, send the AT batch and wait for the prompt
    pub fn initialize<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        info!("Initializing OBD adapter ({:?})", self.protocol);
        self.state = DriverState::Initializing;

        let result = self.handshake(sink);
        self.settle(result)?;

        self.state = DriverState::Ready;
        info!("ELM327 initialized");
        Ok(())
    }

    fn handshake<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        self.transport.reset_buffers()?;
        // Flush any half-typed command and stale prompt
        self.transport.write_all(&[DELIMITER])?;

        let batch = self.protocol.init_sequence();
        self.transport.write_all(&batch)?;

        let reply = self.transport.read_until(PROMPT)?;
        trace!("Handshake reply: {:?}", String::from_utf8_lossy(&reply));
        forward(sink, &reply)?;

        // Adapters answer the batch with anywhere from one prompt to one per
        // command; drain the rest so they don't pair with the first request
        let expected = 1 + batch.iter().filter(|&&b| b == DELIMITER).count();
        let grace = Duration::from_millis(HANDSHAKE_GRACE_MS);
        for _ in 1..expected {
            match self.transport.try_read_until(PROMPT, grace)? {
                Some(reply) => {
                    trace!("Handshake reply: {:?}", String::from_utf8_lossy(&reply));
                    forward(sink, &reply)?;
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Send the next scheduled command and forward its reply
    pub fn step<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        let result = self.exchange(sink);
        self.settle(result)
    }

    fn exchange<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        let (command_index, command) = self.schedule.next_command();
        self.state = DriverState::Cycling { command_index };

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(DELIMITER);

        self.transport.write_all(&line)?;
        self.commands_sent += 1;

        let reply = self.transport.read_until(PROMPT)?;
        forward(sink, &reply)
    }

    fn settle(&mut self, result: Result<(), ObdError>) -> Result<(), ObdError> {
        if let Err(e) = &result {
            if e.is_transport() {
                error!("Adapter transport failed: {}", e);
                self.state = DriverState::Failed;
            }
        }
        result
    }

    /// Handshake, then cycle until stopped, the sink closes or the link fails
    pub fn run<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        self.initialize(sink)?;
        self.cycle(sink)
    }

    /// Cycle through the schedule until stopped, the sink closes or the link
    /// fails. Expects a completed handshake.
    pub fn cycle<W: Write>(&mut self, sink: &mut W) -> Result<(), ObdError> {
        while !self.stop.load(Ordering::Acquire) {
            match self.step(sink) {
                Ok(()) => {}
                Err(ObdError::ChannelClosed) => {
                    debug!("Response channel closed, stopping driver");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        info!("Adapter driver stopped after {} commands", self.commands_sent);
        self.state = DriverState::Ready;
        Ok(())
    }
}

fn forward<W: Write>(sink: &mut W, bytes: &[u8]) -> Result<(), ObdError> {
    sink.write_all(bytes)
        .and_then(|_| sink.flush())
        .map_err(|_| ObdError::ChannelClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::MockAdapter;
    use std::collections::VecDeque;

    fn driver(adapter: MockAdapter, commands: &[&str]) -> AdapterDriver<MockAdapter> {
        let schedule = CommandSchedule::new(commands.iter().map(|c| c.to_string()).collect()).unwrap();
        AdapterDriver::new(adapter, schedule, ObdProtocol::default())
    }

    #[test]
    fn test_handshake_sends_batch_and_forwards_reply() {
        let adapter = MockAdapter::new();
        let log = adapter.command_log();
        let mut driver = driver(adapter, &["010C"]);
        let mut sink = Vec::new();

        driver.initialize(&mut sink).unwrap();

        assert_eq!(driver.state(), DriverState::Ready);
        assert_eq!(*log.lock().unwrap(), ["", "ATZ", "ATE0", "ATSP6"]);
        assert!(sink.ends_with(b">"));
    }

    #[test]
    fn test_lock_step_cycle() {
        let adapter = MockAdapter::new()
            .script("010C", "410C0320\r\r>")
            .script("0105", "410550\r\r>");
        let log = adapter.command_log();
        let mut driver = driver(adapter, &["010C", "0105"]);
        let mut sink = Vec::new();
        driver.initialize(&mut sink).unwrap();
        sink.clear();

        driver.step(&mut sink).unwrap();
        assert_eq!(driver.state(), DriverState::Cycling { command_index: 0 });
        driver.step(&mut sink).unwrap();
        assert_eq!(driver.state(), DriverState::Cycling { command_index: 1 });

        assert_eq!(driver.commands_sent(), 2);
        assert_eq!(&log.lock().unwrap()[4..], ["010C", "0105"]);
        assert!(String::from_utf8_lossy(&sink).contains("410C0320\r\r>"));
        assert!(String::from_utf8_lossy(&sink).ends_with("410550\r\r>"));
    }

    #[test]
    fn test_transport_error_is_fatal() {
        let adapter = MockAdapter::new().disconnect_after(3);
        let mut driver = driver(adapter, &["010D"]);
        let mut sink = Vec::new();

        let err = driver.run(&mut sink).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(driver.commands_sent(), 3);
    }

    #[test]
    fn test_stop_flag_ends_cycle() {
        let mut driver = driver(MockAdapter::new(), &["010D"]);
        driver.stop_handle().store(true, Ordering::Release);
        let mut sink = Vec::new();

        driver.run(&mut sink).unwrap();
        assert_eq!(driver.commands_sent(), 0);
    }

    /// Adapter that answers the whole AT batch with a single banner and prompt
    struct SinglePromptAdapter {
        output: VecDeque<u8>,
    }

    impl SerialTransport for SinglePromptAdapter {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
            let text = String::from_utf8_lossy(bytes).to_ascii_lowercase();
            if text.contains("atz") {
                self.output.extend(b"\r\rELM327 v1.5\r\r>");
            } else if text == "010d\r" {
                self.output.extend(b"410D32\r\r>");
            }
            Ok(())
        }

        fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError> {
            let pos = self
                .output
                .iter()
                .position(|&b| b == delimiter)
                .ok_or(ObdError::Timeout(HANDSHAKE_GRACE_MS))?;
            Ok(self.output.drain(..=pos).collect())
        }

        fn reset_buffers(&mut self) -> Result<(), ObdError> {
            self.output.clear();
            Ok(())
        }
    }

    #[test]
    fn test_single_prompt_handshake() {
        let adapter = SinglePromptAdapter { output: VecDeque::new() };
        let schedule = CommandSchedule::new(vec!["010D".to_string()]).unwrap();
        let mut driver = AdapterDriver::new(adapter, schedule, ObdProtocol::default());
        let mut sink = Vec::new();

        driver.initialize(&mut sink).unwrap();
        assert_eq!(driver.state(), DriverState::Ready);
        assert_eq!(sink, b"\r\rELM327 v1.5\r\r>");

        sink.clear();
        driver.step(&mut sink).unwrap();
        assert_eq!(sink, b"410D32\r\r>");
    }

    #[test]
    fn test_silent_adapter_fails_handshake() {
        let adapter = Silent(SinglePromptAdapter { output: VecDeque::new() });
        let schedule = CommandSchedule::new(vec!["010D".to_string()]).unwrap();
        let mut driver = AdapterDriver::new(adapter, schedule, ObdProtocol::default());

        let err = driver.initialize(&mut Vec::new()).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(driver.state(), DriverState::Failed);
    }

    /// Swallows every write
    struct Silent<T>(T);

    impl<T: SerialTransport> SerialTransport for Silent<T> {
        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), ObdError> {
            Ok(())
        }

        fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>, ObdError> {
            self.0.read_until(delimiter)
        }

        fn reset_buffers(&mut self) -> Result<(), ObdError> {
            self.0.reset_buffers()
        }
    }

    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_closed_sink_stops_cleanly() {
        let mut driver = driver(MockAdapter::new(), &["010D"]);
        let mut sink = Vec::new();
        driver.initialize(&mut sink).unwrap();

        driver.cycle(&mut ClosedSink).unwrap();
        assert_eq!(driver.commands_sent(), 1);
    }
}
