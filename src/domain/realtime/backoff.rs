//! Reconnection policy: how long to wait before each retry and when to stop.
//!
//! ```text
//! attempt:          1     2     3     4     5     6
//! Linear(3s):       3s    6s    9s    12s   15s   (exhausted at max 5)
//! Fixed(3s):        3s    3s    3s    3s    3s    3s ...
//! Exponential(1s):  1s    2s    4s    8s    ... capped at max
//! ```

use std::time::Duration;

use crate::domain::foundation::ValidationError;

/// Delay growth between successive reconnection attempts.
///
/// Every variant is non-decreasing in the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every attempt.
    Fixed(Duration),

    /// `base * attempt`.
    Linear { base: Duration },

    /// `base * 2^(attempt - 1)`, never more than `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before the given attempt. Attempts are numbered from 1;
    /// 0 is treated as 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { base } => base.saturating_mul(attempt),
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let base = match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { base } => base,
            Backoff::Exponential { base, max } => {
                if max < base {
                    return Err(ValidationError::invalid_format(
                        "max_delay",
                        "must not be shorter than the base delay",
                    ));
                }
                base
            }
        };
        if base.is_zero() {
            return Err(ValidationError::out_of_range("base_delay_ms", 1, u64::MAX, 0));
        }
        Ok(())
    }
}

/// Backoff plus an optional ceiling on consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub backoff: Backoff,

    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Default base delay for both chat and notification streams.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(3);

    /// Default ceiling on chat reconnection attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Chat channels: linear 3s steps, at most 5 attempts.
    pub fn chat_default() -> Self {
        Self {
            backoff: Backoff::Linear {
                base: Self::DEFAULT_BASE_DELAY,
            },
            max_attempts: Some(Self::DEFAULT_MAX_ATTEMPTS),
        }
    }

    /// Notifications: a fixed 3s delay, forever.
    pub fn notifications_default() -> Self {
        Self {
            backoff: Backoff::Fixed(Self::DEFAULT_BASE_DELAY),
            max_attempts: None,
        }
    }

    /// Decides the next retry after a closure.
    ///
    /// `attempts` is the number of attempts made since the last successful
    /// open. Returns the new attempt number and its delay, or `None` once the
    /// ceiling is reached.
    pub fn next_attempt(&self, attempts: u32) -> Option<(u32, Duration)> {
        if let Some(max) = self.max_attempts {
            if attempts >= max {
                return None;
            }
        }
        let next = attempts.saturating_add(1);
        Some((next, self.backoff.delay_for(next)))
    }

    /// True when the policy never gives up.
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none()
    }

    /// Validate policy values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.backoff.validate()?;
        if self.max_attempts == Some(0) {
            return Err(ValidationError::out_of_range(
                "max_attempts",
                1,
                u64::from(u32::MAX),
                0,
            ));
        }
        Ok(())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::chat_default()
    }
}
