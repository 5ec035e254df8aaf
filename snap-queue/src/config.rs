//! Pipeline configuration.
//!
//! Every knob has a default matching the documented behaviour and can be
//! overridden through the environment (`from_env`). Malformed values are
//! logged and replaced by the default rather than aborting start-up.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::retry::ExponentialBackoff;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of attempts in flight at once
    pub concurrency: usize,
    /// Attempts per job before it is marked failed
    pub max_attempts: u32,
    /// Base of the exponential retry schedule
    pub retry_base: Duration,
    /// Upper bound of a single retry delay
    pub max_retry_delay: Duration,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            retry_base: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(3600), // 1 hour
            event_capacity: 1000,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            concurrency: env_or("WORKER_CONCURRENCY", d.concurrency).max(1),
            max_attempts: env_or("WORKER_MAX_RETRIES", d.max_attempts).max(1),
            retry_base: env_ms_or("WORKER_RETRY_BASE_MS", d.retry_base),
            max_retry_delay: env_ms_or("WORKER_MAX_RETRY_DELAY_MS", d.max_retry_delay),
            event_capacity: env_or("QUEUE_EVENT_CAPACITY", d.event_capacity).max(1),
        }
    }

    /// Retry policy described by this config
    pub fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.retry_base, self.max_retry_delay)
    }
}

/// Configuration for webhook delivery
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Total delivery attempts for retryable failures
    pub max_retries: u32,
    /// Wait before retry `n` (index `n - 1`); the last entry repeats
    pub retry_delays: Vec<Duration>,
    /// Per-request timeout
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delays: vec![
                Duration::from_secs(60),  // 1 minute
                Duration::from_secs(300), // 5 minutes
                Duration::from_secs(900), // 15 minutes
            ],
            timeout: Duration::from_secs(10),
            user_agent: "Screenshot-API/1.0".to_string(),
        }
    }
}

impl CallbackConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let retry_delays = d
            .retry_delays
            .iter()
            .enumerate()
            .map(|(i, delay)| env_ms_or(&format!("CALLBACK_RETRY_DELAY_{}_MS", i + 1), *delay))
            .collect();

        Self {
            max_retries: env_or("CALLBACK_MAX_RETRIES", d.max_retries).max(1),
            retry_delays,
            timeout: env_ms_or("CALLBACK_TIMEOUT_MS", d.timeout),
            user_agent: env::var("CALLBACK_USER_AGENT").unwrap_or(d.user_agent),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (0-based)
    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.retry_delays
            .get(attempt)
            .or_else(|| self.retry_delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Configuration for the intake rate limiter
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per key per window
    pub max_requests: u32,
    pub window: Duration,
    /// How often expired windows are reclaimed
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_requests: env_or("RATE_LIMIT_MAX_REQUESTS", d.max_requests),
            window: env_ms_or("RATE_LIMIT_WINDOW_MS", d.window),
            cleanup_interval: env_ms_or("RATE_LIMIT_CLEANUP_INTERVAL_MS", d.cleanup_interval),
        }
    }
}

/// Configuration for the janitor
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// How long finished jobs stay queryable
    pub max_age: Duration,
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(3600),        // 1 hour
            sweep_interval: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl RetentionConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_age: env_ms_or("JOB_CLEANUP_MAX_AGE_MS", d.max_age),
            sweep_interval: env_ms_or("JOB_CLEANUP_INTERVAL_MS", d.sweep_interval),
        }
    }
}

/// All pipeline settings
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub queue: QueueConfig,
    pub callback: CallbackConfig,
    pub rate_limit: RateLimitConfig,
    pub retention: RetentionConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            callback: CallbackConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            retention: RetentionConfig::from_env(),
        }
    }
}

/// Read `key` from the environment, falling back to `default` when unset or malformed
pub fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = %key, value = %raw, fallback = ?default, "ignoring malformed config value");
                default
            }
        },
        Err(_) => default,
    }
}

/// Millisecond duration variant of [`env_or`]
pub fn env_ms_or(key: &str, default: Duration) -> Duration {
    Duration::from_millis(env_or(key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue.concurrency, 5);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.callback.max_retries, 3);
        assert_eq!(config.callback.timeout, Duration::from_secs(10));
        assert_eq!(config.callback.user_agent, "Screenshot-API/1.0");
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.retention.max_age, Duration::from_secs(3600));
        assert_eq!(config.retention.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn callback_delays_clamp_to_last_slot() {
        let config = CallbackConfig::default();
        assert_eq!(config.delay_after(0), Duration::from_secs(60));
        assert_eq!(config.delay_after(2), Duration::from_secs(900));
        assert_eq!(config.delay_after(9), Duration::from_secs(900));
    }

    #[test]
    fn env_overrides_and_malformed_values() {
        env::set_var("SNAP_TEST_CONCURRENCY", "12");
        env::set_var("SNAP_TEST_BROKEN", "twelve");
        assert_eq!(env_or("SNAP_TEST_CONCURRENCY", 5usize), 12);
        assert_eq!(env_or("SNAP_TEST_BROKEN", 5usize), 5);
        assert_eq!(env_or("SNAP_TEST_UNSET_KEY", 7u32), 7);
        env::set_var("SNAP_TEST_WINDOW_MS", "250");
        assert_eq!(env_ms_or("SNAP_TEST_WINDOW_MS", Duration::ZERO), Duration::from_millis(250));
    }
}
