use std::sync::Arc;

use snap_queue::{RequestLimiter, Scheduler};

use crate::config::ServerConfig;
use crate::processor::ScreenshotResult;
use crate::request::ScreenshotJob;

pub type ScreenshotQueue = Scheduler<ScreenshotJob, ScreenshotResult>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub queue: ScreenshotQueue,
    pub limiter: Arc<dyn RequestLimiter>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(queue: ScreenshotQueue, limiter: Arc<dyn RequestLimiter>, config: Arc<ServerConfig>) -> Self {
        Self {
            queue,
            limiter,
            config,
        }
    }
}
