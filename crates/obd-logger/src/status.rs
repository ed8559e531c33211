//! Live status line

use std::collections::BTreeMap;
use std::time::Instant;

use obd_protocol::{DecodeError, ObdResponse, ResponseObserver};
use tracing::info;

/// Latest value per PID and the message rate, reported periodically
pub struct LiveStatus {
    latest: BTreeMap<&'static str, String>,
    last_message: Option<String>,
    received: u64,
    skipped: u64,
    window_start: Instant,
    window_count: u64,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self {
            latest: BTreeMap::new(),
            last_message: None,
            received: 0,
            skipped: 0,
            window_start: Instant::now(),
            window_count: 0,
        }
    }

    /// Responses seen so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames that could not be decoded
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Most recent display string for `name`
    pub fn latest(&self, name: &str) -> Option<&str> {
        self.latest.get(name).map(String::as_str)
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Status line for the window ending at `now`
    pub fn summary(&self, now: Instant) -> String {
        let elapsed = now.duration_since(self.window_start).as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.window_count as f64 / elapsed
        } else {
            0.0
        };

        let mut line = format!("{:.1} msg/s", rate);
        for (name, value) in &self.latest {
            line.push_str(&format!(" | {}: {}", name, value));
        }
        line
    }

    /// Log the status line and start a new rate window
    pub fn report(&mut self) -> String {
        let now = Instant::now();
        let line = self.summary(now);
        info!("{}", line);
        self.window_start = now;
        self.window_count = 0;
        line
    }
}

impl Default for LiveStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseObserver for LiveStatus {
    fn on_response(&mut self, response: &ObdResponse) {
        self.received += 1;
        self.window_count += 1;
        self.latest
            .insert(response.name(), format!("{} {}", response.value, response.unit));
        self.last_message = Some(response.to_string());
    }

    fn on_decode_error(&mut self, error: &DecodeError) {
        self.skipped += 1;
        self.last_message = Some(error.to_string());
    }
}
