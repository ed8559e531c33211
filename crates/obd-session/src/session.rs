//! Adapter Session
//!
//! Runs an [`AdapterDriver`] on its own OS thread and turns the bytes it
//! forwards into an async stream of decoded responses. Blocking serial calls
//! never touch the runtime; the only link between the two sides is the byte
//! pipe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use futures::stream::{self, Stream};
use obd_protocol::{
    DecodeError, FrameSplitter, ObdError, ObdProtocol, ObdResponse, RawFrame, ResponseDecoder,
    SerialLink, SerialTransport, DEFAULT_RESPONSE_TIMEOUT_MS,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::driver::AdapterDriver;
use crate::pipe::{pipe, unix_now, PipeReader, DEFAULT_PIPE_CAPACITY};
use crate::schedule::CommandSchedule;

const DRIVER_THREAD_NAME: &str = "elm-driver";

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bytes allowed in flight between driver and consumer
    pub pipe_capacity: usize,
    /// Protocol selected during the handshake
    pub protocol: ObdProtocol,
    /// Command cycle
    pub schedule: CommandSchedule,
    /// Time allowed for one adapter response
    pub response_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            protocol: ObdProtocol::default(),
            schedule: CommandSchedule::default(),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
        }
    }
}

/// A running adapter session
pub struct AdapterSession {
    reader: PipeReader,
    decoder: Arc<ResponseDecoder>,
    ready: watch::Receiver<bool>,
    stop: Arc<AtomicBool>,
    outcome: Option<oneshot::Receiver<Result<(), ObdError>>>,
    failure: Option<ObdError>,
    driver: Option<JoinHandle<()>>,
}

impl AdapterSession {
    /// Open a serial port and start a session on it
    pub fn open(device: &str, baud_rate: u32, config: SessionConfig) -> Result<Self, ObdError> {
        let mut link = SerialLink::open(device, baud_rate)?;
        link.set_response_timeout(config.response_timeout);
        Self::spawn(link, config)
    }

    /// Start the driver thread on `transport`
    pub fn spawn<T>(transport: T, config: SessionConfig) -> Result<Self, ObdError>
    where
        T: SerialTransport + 'static,
    {
        let mut driver = AdapterDriver::new(transport, config.schedule, config.protocol);
        let stop = driver.stop_handle();
        let (mut writer, reader) = pipe(config.pipe_capacity);
        let (ready_tx, ready) = watch::channel(false);
        let (outcome_tx, outcome) = oneshot::channel();

        let handle = std::thread::Builder::new()
            .name(DRIVER_THREAD_NAME.to_string())
            .spawn(move || {
                let result = driver.initialize(&mut writer).and_then(|()| {
                    ready_tx.send_replace(true);
                    driver.cycle(&mut writer)
                });
                let result = match result {
                    Err(ObdError::ChannelClosed) => Ok(()),
                    other => other,
                };
                // Outcome must be in place before the consumer sees end-of-stream
                let _ = outcome_tx.send(result);
                drop(writer);
            })
            .map_err(|e| ObdError::SerialError(format!("Failed to start driver thread: {}", e)))?;

        info!("Adapter session started (pipe capacity {} bytes)", config.pipe_capacity);

        Ok(Self {
            reader,
            decoder: Arc::new(ResponseDecoder::standard()),
            ready,
            stop,
            outcome: Some(outcome),
            failure: None,
            driver: Some(handle),
        })
    }

    /// True once the handshake prompt was observed
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the handshake to complete
    pub async fn ready(&mut self) -> Result<(), ObdError> {
        if self.ready.wait_for(|ready| *ready).await.is_ok() {
            return Ok(());
        }
        // Driver exited before the prompt
        match self.take_outcome() {
            Some(Err(e)) => Err(e),
            _ => Err(ObdError::AdapterNotResponding),
        }
    }

    /// Decoded responses in the order the adapter sent them.
    ///
    /// Decode failures arrive as `Err(ObdError::Decode(_))` items and the
    /// stream carries on. A transport failure of the driver is the last item
    /// before the stream ends. Each call starts a fresh framing state.
    pub fn responses(&mut self) -> impl Stream<Item = Result<ObdResponse, ObdError>> + '_ {
        let state = ResponseState {
            session: self,
            splitter: FrameSplitter::new(),
            pending: VecDeque::new(),
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                state.pull().await;
            }
        })
    }

    /// Stop the driver, close the pipe and join the driver thread.
    ///
    /// Returns the driver's transport error, if it failed.
    pub async fn shutdown(mut self) -> Result<(), ObdError> {
        info!("Shutting down adapter session");
        self.stop.store(true, Ordering::Release);
        self.reader.close();

        if let Some(handle) = self.driver.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                return Err(ObdError::SerialError("Driver thread panicked".to_string()));
            }
        }

        match self.take_outcome() {
            Some(result) => result,
            None => self.failure.take().map_or(Ok(()), Err),
        }
    }

    fn take_outcome(&mut self) -> Option<Result<(), ObdError>> {
        let result = self.outcome.take()?.try_recv().ok()?;
        if let Err(e) = &result {
            self.failure = Some(e.clone());
        }
        Some(result)
    }

    fn decode(&self, frame: &RawFrame, timestamp: f64) -> Result<ObdResponse, ObdError> {
        self.decoder.decode(frame, timestamp).map_err(|e| {
            report(&e);
            ObdError::Decode(e)
        })
    }
}

impl Drop for AdapterSession {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.reader.close();
    }
}

struct ResponseState<'a> {
    session: &'a mut AdapterSession,
    splitter: FrameSplitter,
    pending: VecDeque<Result<ObdResponse, ObdError>>,
    done: bool,
}

impl ResponseState<'_> {
    async fn pull(&mut self) {
        match self.session.reader.recv().await {
            Some(chunk) => {
                let (frames, _) = self.splitter.feed(&chunk.bytes);
                for frame in frames {
                    let item = self.session.decode(&frame, chunk.received_at);
                    self.pending.push_back(item);
                }
            }
            None => {
                if let Some(frame) = self.splitter.finish() {
                    let item = self.session.decode(&frame, unix_now());
                    self.pending.push_back(item);
                }
                if let Some(Err(e)) = self.session.take_outcome() {
                    self.pending.push_back(Err(e));
                }
                debug!("Response stream ended");
                self.done = true;
            }
        }
    }
}

fn report(error: &DecodeError) {
    match error {
        DecodeError::AdapterMessage(text) => debug!("Adapter message: {}", text),
        other => warn!("Skipping frame {:?}: {}", other.frame(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use obd_protocol::{MockAdapter, Pid};

    fn config(commands: &[&str]) -> SessionConfig {
        SessionConfig {
            schedule: CommandSchedule::new(commands.iter().map(|c| c.to_string()).collect()).unwrap(),
            ..SessionConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ready_after_handshake() {
        let mut session = AdapterSession::spawn(MockAdapter::new(), config(&["010D"])).unwrap();
        session.ready().await.unwrap();
        assert!(session.is_ready());
        session.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stream_skips_chatter_and_decodes() {
        let adapter = MockAdapter::new().script("010C", "410C0320\r>");
        let mut session = AdapterSession::spawn(adapter, config(&["010C"])).unwrap();

        let first = {
            let responses = session.responses();
            futures::pin_mut!(responses);
            let mut first = None;
            while let Some(item) = responses.next().await {
                match item {
                    Ok(response) => {
                        first = Some(response);
                        break;
                    }
                    Err(ObdError::Decode(DecodeError::AdapterMessage(_))) => continue,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            first.unwrap()
        };

        assert_eq!(first.pid(), Some(Pid::Rpm));
        assert_eq!(first.value.as_f64(), Some(200.0));
        session.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_handshake_failure_reported_by_ready() {
        let adapter = MockAdapter::new();
        let mut session = AdapterSession::spawn(
            FailingTransport(adapter),
            config(&["010D"]),
        )
        .unwrap();

        let err = session.ready().await.unwrap_err();
        assert!(err.is_transport());
        assert!(session.shutdown().await.unwrap_err().is_transport());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ready_when_batch_answers_with_one_prompt() {
        // Only the reset banner ends in a prompt
        let adapter = MockAdapter::new()
            .script("", "")
            .script("ATE0", "")
            .script("ATSP6", "");
        let mut session = AdapterSession::spawn(adapter, config(&["010D"])).unwrap();
        session.ready().await.unwrap();

        let speed = {
            let responses = session.responses();
            futures::pin_mut!(responses);
            let mut speed = None;
            while let Some(item) = responses.next().await {
                match item {
                    Ok(response) => {
                        speed = Some(response);
                        break;
                    }
                    Err(ObdError::Decode(_)) => continue,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            speed.unwrap()
        };

        assert_eq!(speed.pid(), Some(Pid::Speed));
        session.shutdown().await.unwrap();
    }

    struct FailingTransport(MockAdapter);

    impl SerialTransport for FailingTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
            self.0.write_all(bytes)
        }

        fn read_until(&mut self, _delimiter: u8) -> Result<Vec<u8>, ObdError> {
            Err(ObdError::Timeout(DEFAULT_RESPONSE_TIMEOUT_MS))
        }

        fn reset_buffers(&mut self) -> Result<(), ObdError> {
            self.0.reset_buffers()
        }
    }
}
