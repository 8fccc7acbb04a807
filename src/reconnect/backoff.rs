//! Retry policy and delay schedules

use crate::config::{BackoffKind, ReconnectConfig};
use rand::Rng;
use std::time::Duration;

/// Largest exponent applied to the base delay
const MAX_DOUBLINGS: u32 = 16;

/// Delay schedule between a failure and the next connection
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// The same delay before every reconnect
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`, optionally with ±25% jitter
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before reconnect number `attempt`, counting from 1
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max, jitter } => {
                let doublings = attempt.saturating_sub(1).min(MAX_DOUBLINGS);
                let delay = base.saturating_mul(1u32 << doublings).min(*max);
                if *jitter {
                    with_jitter(delay)
                } else {
                    delay
                }
            }
        }
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.75..=1.25);
    delay.mul_f64(factor)
}

/// How a [`super::Reconnector`] reacts to failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Reconnects allowed before giving up
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Clear the attempt counter once a reconnected stream forwards an event
    pub reset_on_progress: bool,
    /// Stop after forwarding an upstream-reported error
    pub stop_on_upstream_error: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            reset_on_progress: true,
            stop_on_upstream_error: true,
        }
    }
}

impl RetryPolicy {
    /// Fixed 2s delay, a budget that never resets and no stop on upstream
    /// errors
    pub fn parity() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(2)),
            reset_on_progress: false,
            stop_on_upstream_error: false,
        }
    }

    /// Give up on the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl From<&ReconnectConfig> for RetryPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        let base = Duration::from_millis(config.retry_delay_ms);
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.max_delay_ms),
                jitter: config.jitter,
            },
        };
        Self {
            max_attempts: config.max_attempts,
            backoff,
            reset_on_progress: config.reset_on_progress,
            stop_on_upstream_error: config.stop_on_upstream_error,
        }
    }
}
