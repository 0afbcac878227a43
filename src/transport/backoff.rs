use std::time::Duration;

use crate::{
    configs::ReconnectConfig,
    transport::constants::{BACKOFF_MAX_EXPONENT, UNLIMITED_ATTEMPTS},
};

/// Reconnect delays: `base`, `2 * base`, `4 * base`, ... capped at
/// `base * 2^BACKOFF_MAX_EXPONENT`.
pub struct Backoff {
    attempt: u32,
    base_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            attempt: 0,
            base_ms: config.base_delay_ms,
            max_attempts: config.max_attempts,
        }
    }

    pub fn next(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let exponent = (self.attempt - 1).min(BACKOFF_MAX_EXPONENT);
        Duration::from_millis(self.base_ms.saturating_mul(2u64.pow(exponent)))
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_attempts != UNLIMITED_ATTEMPTS && self.attempt >= self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
