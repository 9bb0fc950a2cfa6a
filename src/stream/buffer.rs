//! Time-windowed output buffer

use std::time::Duration;

use tokio::time::Instant;

/// Accumulates filtered text between two deliveries
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    last_flush: Instant,
}

impl OutputBuffer {
    /// Create an empty buffer whose window starts at `now`
    pub fn new(now: Instant) -> Self {
        Self {
            text: String::new(),
            last_flush: now,
        }
    }

    /// Append text
    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Whether nothing is waiting for delivery
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Buffer holds text and the window since the last delivery has elapsed
    pub fn should_flush(&self, now: Instant, interval: Duration) -> bool {
        !self.text.is_empty() && now.saturating_duration_since(self.last_flush) >= interval
    }

    /// Take the buffered text and start a new window at `now`
    pub fn take(&mut self, now: Instant) -> String {
        self.last_flush = now;
        std::mem::take(&mut self.text)
    }
}
