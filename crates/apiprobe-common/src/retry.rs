//! Retry policy and backoff computation.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Every retry waits `initial_delay_ms`
    Fixed,
    /// Retry `n` waits `initial_delay_ms * (n + 1)`
    Linear,
    /// Retry `n` waits `initial_delay_ms * 2^n`
    Exponential,
}

/// Configuration for retrying failed calls.
///
/// Total attempts for one call = `max_attempts + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries (excluding the initial attempt)
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    /// Base delay in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on any computed delay, in milliseconds
    pub max_delay_ms: u64,
    /// Perturb each delay by up to ±10%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Fraction of the delay used as the jitter range.
    pub const JITTER_RATIO: f64 = 0.1;

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    ///
    /// Always capped at `max_delay_ms`; overflow saturates to the cap.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay_ms;
        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => initial,
            BackoffStrategy::Linear => initial.saturating_mul(u64::from(attempt) + 1),
            BackoffStrategy::Exponential => {
                let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
                initial.saturating_mul(factor)
            }
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    /// Delay before retry number `attempt`, with jitter applied when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }

        let factor = rand::thread_rng().gen_range(-Self::JITTER_RATIO..=Self::JITTER_RATIO);
        let jittered_ms = (base.as_millis() as f64 * (1.0 + factor))
            .max(0.0)
            .min(self.max_delay_ms as f64);
        Duration::from_millis(jittered_ms as u64)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_delay_ms < self.initial_delay_ms {
            errors.push(format!(
                "retry max_delay_ms ({}) must be >= initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            ));
        }
        errors
    }
}
