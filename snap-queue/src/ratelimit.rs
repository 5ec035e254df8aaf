//! Fixed-window request counting per client key.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{config::RateLimitConfig, error::RateLimitError};

const KEY_PREFIX: &str = "ratelimit:";

/// Snapshot of a key's window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    #[serde(rename = "resetIn")]
    pub reset_in_secs: u64,
}

/// Admission check used by the intake path.
///
/// Implementations backed by a remote store may fail; callers treat an error
/// as "allowed".
#[async_trait]
pub trait RequestLimiter: Send + Sync + 'static {
    async fn check(&self, key: &str) -> Result<bool, RateLimitError>;

    async fn info(&self, key: &str) -> Result<RateLimitInfo, RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl Window {
    fn is_live(&self, now: Instant) -> bool {
        now < self.reset_at
    }
}

/// In-memory limiter: at most one live window per key.
///
/// Increments on a key go through the map's shard lock, so concurrent
/// requests never lose counts.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests,
            window: config.window,
        }
    }

    fn storage_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Count a request against `key`; `true` while the window's count is
    /// within the limit. Rejected requests still increment the counter.
    pub fn check_and_consume(&self, key: &str) -> bool {
        let now = Instant::now();
        let fresh = Window {
            count: 1,
            reset_at: now + self.window,
        };

        // Opening a window always admits the request
        let mut entry = match self.windows.entry(Self::storage_key(key)) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                return true;
            }
            Entry::Occupied(occupied) => occupied,
        };
        let window = entry.get_mut();
        if !window.is_live(now) {
            *window = fresh;
            return true;
        }

        window.count = window.count.saturating_add(1);
        let allowed = window.count <= self.max_requests;
        if !allowed {
            debug!(key = %key, count = window.count, limit = self.max_requests, "rate limit exceeded");
        }
        allowed
    }

    pub fn info(&self, key: &str) -> RateLimitInfo {
        let now = Instant::now();
        let live = self
            .windows
            .get(&Self::storage_key(key))
            .map(|w| *w)
            .filter(|w| w.is_live(now));

        match live {
            Some(window) => RateLimitInfo {
                count: window.count,
                limit: self.max_requests,
                remaining: self.max_requests.saturating_sub(window.count),
                reset_in_secs: window.reset_at.saturating_duration_since(now).as_secs(),
            },
            None => RateLimitInfo {
                count: 0,
                limit: self.max_requests,
                remaining: self.max_requests,
                reset_in_secs: self.window.as_secs(),
            },
        }
    }

    /// Drop expired windows; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| window.is_live(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked keys, expired or not
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Reclaim expired windows every `every` until the handle is shut down
    pub fn spawn_sweeper(self: &std::sync::Arc<Self>, every: Duration) -> SweeperHandle {
        let limiter = std::sync::Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep_expired();
                        if removed > 0 {
                            info!(removed, "cleaned up expired rate limit windows");
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

#[async_trait]
impl RequestLimiter for RateLimiter {
    async fn check(&self, key: &str) -> Result<bool, RateLimitError> {
        Ok(self.check_and_consume(key))
    }

    async fn info(&self, key: &str) -> Result<RateLimitInfo, RateLimitError> {
        Ok(RateLimiter::info(self, key))
    }
}

/// Owner of the limiter's background sweep task
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
