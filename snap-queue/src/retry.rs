use std::time::Duration;

/// Maps the number of attempts already made to the delay before the next one
pub trait RetryPolicy: Send + Sync + 'static {
    fn delay(&self, attempts: u32) -> Duration;
}

/// `base * 2^attempts`, capped at `max`.
///
/// With the default 1s base a 3-attempt job retries after 2s and then 4s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, attempts: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Explicit schedule indexed by attempt; the last entry repeats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDelays(pub Vec<Duration>);

impl RetryPolicy for FixedDelays {
    fn delay(&self, attempts: u32) -> Duration {
        let index = (attempts as usize).saturating_sub(1);
        self.0
            .get(index)
            .or_else(|| self.0.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
