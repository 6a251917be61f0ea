// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded retry policy with exponential backoff.
//
// Every delivery failure is treated alike: the printer gets `max_attempts`
// tries per job, with the wait doubling after each failure.  There is no
// jitter because there is exactly one printer and one worker.

use std::time::Duration;

use quittung_core::AppConfig;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total delivery attempts per job (first try included).
    pub max_attempts: u32,
    /// Wait after the first failed attempt.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&AppConfig> for RetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    RetryAfter(Duration),
    /// Budget spent; dead-letter the job.
    Exhausted,
}

/// Decide what follows failed attempt number `attempt` (1-indexed).
pub fn should_retry(attempt: u32, config: &RetryConfig) -> RetryDecision {
    if attempt >= config.max_attempts {
        warn!(attempt, max = config.max_attempts, "retry limit exhausted");
        RetryDecision::Exhausted
    } else {
        let delay = compute_delay(attempt, config);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
        RetryDecision::RetryAfter(delay)
    }
}

/// delay = base * 2^(attempt - 1), saturating.
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    config.base_delay.saturating_mul(1u32 << exponent)
}
