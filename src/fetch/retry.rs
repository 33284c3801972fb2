use std::time::Duration;

/// Bounded exponential backoff.
///
/// Attempts are numbered from 1. The wait before attempt `k` (k ≥ 2) is
/// `base * 2^(k-2)`, i.e. the wait after failed attempt `n` is `base * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay after failed attempt `attempt`, or `None` when it was the last one
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1)?;
        self.base_delay.checked_mul(factor)
    }

    /// Sum of every wait a fully failing fetch goes through
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

/// Whether a status code looks like upstream bot detection
pub fn is_bot_block(status: u16) -> bool {
    matches!(status, 401 | 403)
}
