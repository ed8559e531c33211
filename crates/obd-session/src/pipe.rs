//! Byte Pipe Between the Driver Thread and the Async Consumer
//!
//! The writer half is a blocking `std::io::Write` used from the driver thread;
//! the reader half is awaited from the runtime. Bytes in flight are bounded by
//! a byte budget: a writer that would exceed it blocks until the reader drains,
//! so a slow consumer slows the command cycle down instead of losing data.

use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

/// Default byte budget of the pipe (2 MiB)
pub const DEFAULT_PIPE_CAPACITY: usize = 2048 * 1024;

/// Bytes read from the adapter in one go
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Seconds since the Unix epoch when the driver finished reading
    pub received_at: f64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct BudgetState {
    in_flight: usize,
    reader_closed: bool,
}

#[derive(Debug, Default)]
struct Budget {
    state: Mutex<BudgetState>,
    space: Condvar,
}

impl Budget {
    fn lock(&self) -> MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, n: usize) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(n);
        drop(state);
        self.space.notify_all();
    }

    fn close(&self) {
        self.lock().reader_closed = true;
        self.space.notify_all();
    }
}

/// Create a pipe holding at most `capacity` bytes in flight
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    let budget = Arc::new(Budget::default());
    (
        PipeWriter {
            tx,
            budget: Arc::clone(&budget),
            capacity: capacity.max(1),
        },
        PipeReader { rx, budget },
    )
}

/// Blocking writer half
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::UnboundedSender<Chunk>,
    budget: Arc<Budget>,
    capacity: usize,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(self.capacity);

        let mut state = self.budget.lock();
        while !state.reader_closed && state.in_flight > 0 && state.in_flight + n > self.capacity {
            state = self
                .budget
                .space
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.reader_closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"));
        }
        state.in_flight += n;
        drop(state);

        let chunk = Chunk {
            received_at: unix_now(),
            bytes: buf[..n].to_vec(),
        };
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Async reader half
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::UnboundedReceiver<Chunk>,
    budget: Arc<Budget>,
}

impl PipeReader {
    /// Next chunk, or `None` once every writer is gone and the pipe is drained
    pub async fn recv(&mut self) -> Option<Chunk> {
        let chunk = self.rx.recv().await?;
        self.budget.release(chunk.bytes.len());
        Some(chunk)
    }

    /// Stop accepting data; blocked writers fail with `BrokenPipe`
    pub fn close(&mut self) {
        self.rx.close();
        self.budget.close();
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.budget.close();
    }
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
