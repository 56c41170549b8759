//! Polling policy for conversions the upstream reports as `queued`.

use std::{fmt, str::FromStr, time::Duration};

/// How many times a queued conversion is resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    Bounded(u32),
    /// Keep polling until the overall relay deadline elapses.
    Unbounded,
}

impl FromStr for RetryLimit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("unbounded") || value.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Unbounded);
        }
        value
            .parse::<u32>()
            .map(Self::Bounded)
            .map_err(|_| format!("expected a retry count or \"unbounded\", got {value:?}"))
    }
}

impl fmt::Display for RetryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(count) => write!(f, "{count}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDecision {
    GiveUp,
    RetryAfter(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct QueueRetryPolicy {
    pub limit: RetryLimit,
    /// Delay before the first resubmission.
    pub base_delay: Duration,
    /// Multiplier applied per further retry; 1 keeps the delay fixed.
    pub backoff_factor: u32,
    pub max_delay: Duration,
}

impl Default for QueueRetryPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Bounded(1),
            base_delay: Duration::from_secs(3),
            backoff_factor: 1,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl QueueRetryPolicy {
    /// `retries_done` counts resubmissions already made for this request.
    pub fn decide(&self, retries_done: u32) -> QueueDecision {
        if let RetryLimit::Bounded(max) = self.limit
            && retries_done >= max
        {
            return QueueDecision::GiveUp;
        }

        QueueDecision::RetryAfter(self.delay_for(retries_done))
    }

    /// Backoff delay before the next resubmission, ignoring the limit.
    pub fn delay_for(&self, retries_done: u32) -> Duration {
        let exponent = retries_done.min(16);
        let multiplier = self.backoff_factor.max(1).saturating_pow(exponent);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }
}
