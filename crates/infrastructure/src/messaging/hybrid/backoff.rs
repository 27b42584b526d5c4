//! Exponential backoff configuration for outbox retries.
//!
//! ```text
//! Attempt        Delay (base=5s)    With jitter (±10%)
//! ─────────────────────────────────────────────────────
//!     0              5s              4.5s - 5.5s
//!     1             10s              9s - 11s
//!     2             20s             18s - 22s
//!     3             40s             36s - 44s
//!     4             80s             72s - 88s
//!    >=5         FAILED             Max attempts exceeded
//! ```

use chrono::Duration;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_BASE_DELAY_SECS: i64 = 5;
const DEFAULT_MAX_DELAY_SECS: i64 = 1800;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;
const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Retry strategy shared by the fallback sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay in seconds
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: i64,

    /// Maximum delay in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: i64,

    /// Jitter as a fraction of the delay (0.1 = ±10%)
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,

    /// Attempts before an entry is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

fn default_base_delay() -> i64 {
    DEFAULT_BASE_DELAY_SECS
}

fn default_max_delay() -> i64 {
    DEFAULT_MAX_DELAY_SECS
}

fn default_jitter() -> f64 {
    DEFAULT_JITTER_FACTOR
}

fn default_max_attempts() -> i32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl fmt::Display for BackoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackoffConfig(base_delay={}s, max_delay={}s, jitter={:.1}%, max_attempts={})",
            self.base_delay_secs,
            self.max_delay_secs,
            self.jitter_factor * 100.0,
            self.max_attempts
        )
    }
}

impl BackoffConfig {
    /// 5s base, 30min cap, ±10% jitter, 5 attempts.
    pub fn standard() -> Self {
        Self::default()
    }

    /// `delay = min(base * 2^attempt, max) ± jitter`
    pub fn calculate_delay(&self, attempt: i32) -> Duration {
        let raw_delay = self
            .base_delay_secs
            .saturating_mul(2i64.saturating_pow(attempt.max(0) as u32));
        let delay = raw_delay.min(self.max_delay_secs);

        let jitter_range = (delay as f64 * self.jitter_factor) as i64;
        let jitter = if jitter_range > 0 {
            let mut rng = rand::thread_rng();
            rng.gen_range(-jitter_range..=jitter_range)
        } else {
            0
        };

        Duration::seconds(delay + jitter)
    }

    pub fn can_retry(&self, attempt: i32) -> bool {
        attempt < self.max_attempts
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }
}
