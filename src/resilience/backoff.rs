//! # Retry Policy
//!
//! Exponential backoff with jitter and explicit retry budgets for readiness
//! probing. Every knob is configuration; nothing here is hard-coded beyond
//! the defaults in [`crate::constants`].
//!
//! ```rust
//! use startup_gate::resilience::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     jitter_factor: 0.0,
//!     ..RetryPolicy::default()
//! };
//! assert_eq!(policy.delay_for(1), Duration::from_millis(500));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(1));
//! ```

use crate::config::{ConfigResult, ConfigurationError};
use crate::constants::{
    DEFAULT_INITIAL_INTERVAL_MS, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_ELAPSED_MS, DEFAULT_MAX_INTERVAL_MS, DEFAULT_MULTIPLIER, LEGACY_POLL_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff and retry budget for a readiness wait.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub initial_interval_ms: u64,
    /// Upper bound for any single delay, jitter included
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// Fraction (0.0 - 1.0) of the delay added as random jitter
    pub jitter_factor: f64,
    /// Give up after this many failed probes
    pub max_attempts: Option<u32>,
    /// Give up once the next delay would cross this much total wait. Each
    /// attempt is also cut off when it would run past it
    pub max_elapsed_ms: Option<u64>,
    /// Permit a policy with neither bound (retry forever)
    pub allow_unbounded: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MS,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            multiplier: DEFAULT_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            max_elapsed_ms: Some(DEFAULT_MAX_ELAPSED_MS),
            allow_unbounded: false,
        }
    }
}

impl RetryPolicy {
    /// Fixed one second polling with no limit.
    pub fn legacy() -> Self {
        let interval = LEGACY_POLL_INTERVAL.as_millis() as u64;
        Self {
            initial_interval_ms: interval,
            max_interval_ms: interval,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: None,
            max_elapsed_ms: None,
            allow_unbounded: true,
        }
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.max_elapsed_ms.is_some()
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let cap = self.max_interval();

        // powi overflows to inf long before u64 millis would
        let base = if factor.is_finite() {
            let millis = self.initial_interval_ms as f64 * factor;
            if millis >= cap.as_millis() as f64 {
                cap
            } else {
                Duration::from_millis(millis as u64)
            }
        } else {
            cap
        };

        let jittered = if self.jitter_factor > 0.0 {
            let jitter = fastrand::f64() * self.jitter_factor;
            base.mul_f64(1.0 + jitter)
        } else {
            base
        };

        jittered.min(cap)
    }

    /// Whether another probe may run after `failed_attempts` failures.
    pub fn attempts_remaining(&self, failed_attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => failed_attempts < max,
            None => true,
        }
    }

    /// Whether sleeping `next_delay` on top of `elapsed` stays inside the time budget.
    pub fn within_elapsed_budget(&self, elapsed: Duration, next_delay: Duration) -> bool {
        match self.max_elapsed() {
            Some(budget) => elapsed.saturating_add(next_delay) <= budget,
            None => true,
        }
    }

    /// Time left in the elapsed budget, `None` when there is no such budget.
    pub fn remaining_budget(&self, elapsed: Duration) -> Option<Duration> {
        self.max_elapsed().map(|budget| budget.saturating_sub(elapsed))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.initial_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.initial_interval_ms",
                self.initial_interval_ms,
                "must be greater than zero",
            ));
        }
        if self.max_interval_ms < self.initial_interval_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_interval_ms",
                self.max_interval_ms,
                format!(
                    "must be at least initial_interval_ms ({})",
                    self.initial_interval_ms
                ),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.multiplier,
                "must be a finite number >= 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "retry.jitter_factor",
                self.jitter_factor,
                "must be between 0.0 and 1.0",
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                0,
                "must be at least 1 when set",
            ));
        }
        if !self.is_bounded() && !self.allow_unbounded {
            return Err(ConfigurationError::missing_required_field(
                "retry.max_attempts or retry.max_elapsed_ms",
                "retry policy (set retry.allow_unbounded to wait forever)",
            ));
        }
        Ok(())
    }
}
