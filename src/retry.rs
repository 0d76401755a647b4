use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ExtratoError, Result, SheetError};

/// Bounded exponential backoff for calls to the spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1));
        let ms = (1..retry).fold(self.initial_delay_ms, |acc, _| acc.saturating_mul(factor));
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// The full wait schedule between attempts.
    pub fn delays(&self) -> Vec<Duration> {
        (1..self.attempts()).map(|r| self.delay_for(r)).collect()
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut(u32) -> std::result::Result<T, SheetError>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T> {
        let attempts = self.attempts();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, ?delay, "{what} failed, retrying: {err}");
                    sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ExtratoError::ExternalWrite {
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }

    pub fn run_blocking<T>(
        &self,
        what: &str,
        op: impl FnMut(u32) -> std::result::Result<T, SheetError>,
    ) -> Result<T> {
        self.run(what, op, std::thread::sleep)
    }
}
