use std::time::Duration;

/// Reconnect delay that doubles on every failed attempt up to a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(base);
        Self {
            base,
            ceiling,
            current: base,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn grow(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.ceiling);
    }
}
