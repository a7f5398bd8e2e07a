//! Retry budgets and backoff policies.
//!
//! One policy object is injected into both the action primitives and the
//! authentication controller so retry behaviour is consistent across layers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maps an attempt number (1-based) to the delay before the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay after every attempt
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },
    /// `base * attempt`
    Linear {
        /// Base delay in milliseconds
        base_ms: u64,
    },
    /// `base * 2^(attempt-1)`, capped at `max`
    Exponential {
        /// Base delay in milliseconds
        base_ms: u64,
        /// Upper bound in milliseconds
        max_ms: u64,
    },
}

impl BackoffPolicy {
    /// Fixed delay
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Linear delay
    #[must_use]
    pub const fn linear(base: Duration) -> Self {
        Self::Linear {
            base_ms: base.as_millis() as u64,
        }
    }

    /// Exponential delay with a cap
    #[must_use]
    pub const fn exponential(base: Duration, max: Duration) -> Self {
        Self::Exponential {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Delay after the given attempt. Attempt 0 is treated as 1.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = u64::from(attempt.max(1));
        let ms = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Linear { base_ms } => base_ms.saturating_mul(attempt),
            Self::Exponential { base_ms, max_ms } => {
                let shift = (attempt - 1).min(32) as u32;
                base_ms.saturating_mul(1u64 << shift).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Fixed { delay_ms: 500 }
    }
}

/// Attempt budget plus backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay between attempts
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::actions()
    }
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Action primitives: 3 attempts, fixed 500ms
    #[must_use]
    pub const fn actions() -> Self {
        Self::new(3, BackoffPolicy::Fixed { delay_ms: 500 })
    }

    /// Login flow: 3 attempts, linear 3s
    #[must_use]
    pub const fn authentication() -> Self {
        Self::new(3, BackoffPolicy::Linear { base_ms: 3000 })
    }

    /// Set the attempt budget
    #[must_use]
    pub const fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the backoff
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Attempts actually made; a zero budget still makes one attempt
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after a failed `attempt`, or `None` after the last one
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.attempts()).then(|| self.backoff.delay_for(attempt))
    }

    /// Sum of every delay the policy can sleep
    #[must_use]
    pub fn total_delay(&self) -> Duration {
        (1..self.attempts()).map(|a| self.backoff.delay_for(a)).sum()
    }
}
