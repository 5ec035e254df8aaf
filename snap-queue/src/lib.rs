//! # snap-queue: asynchronous screenshot job pipeline
//!
//! In-process building blocks for accepting render jobs and delivering their
//! results later:
//!
//! - [`Scheduler`]: FIFO pending list feeding a bounded pool of worker slots,
//!   per-job retries with exponential backoff, lifecycle events
//! - [`RateLimiter`]: fixed-window request counting per client key
//! - [`CallbackSender`]: webhook POST with its own retry schedule
//! - [`Janitor`]: periodic eviction of finished jobs
//!
//! ```no_run
//! use snap_queue::prelude::*;
//!
//! # async fn demo() -> QueueResult<()> {
//! let queue: Scheduler<String, usize> = Scheduler::new(QueueConfig::default());
//! queue.set_processor(
//!     5,
//!     processor_fn(|ctx: JobContext<String>| async move {
//!         ctx.progress.report(50);
//!         Ok::<_, JobError>(ctx.input.len())
//!     }),
//! );
//!
//! let job = queue.submit("https://example.com".to_string())?;
//! let outcome = queue.wait(&job.id).await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod janitor;
pub mod processor;
pub mod ratelimit;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(feature = "tracing-basic")]
pub mod telemetry;

pub use callback::{CallbackErrorInfo, CallbackPayload, CallbackSender, CallbackStatus, ScreenshotInfo};
pub use config::{CallbackConfig, PipelineConfig, QueueConfig, RateLimitConfig, RetentionConfig};
pub use error::{
    CallbackError, JobError, QueueError, QueueResult, RateLimitError, DEFAULT_ERROR_CODE,
    PANIC_ERROR_CODE,
};
pub use janitor::{Janitor, JanitorHandle};
pub use processor::{processor_fn, FnProcessor, JobContext, Processor, ProgressReporter};
pub use ratelimit::{RateLimitInfo, RateLimiter, RequestLimiter, SweeperHandle};
pub use retry::{ExponentialBackoff, FixedDelays, RetryPolicy};
pub use scheduler::Scheduler;
pub use store::JobStore;
pub use types::{JobEvent, JobId, JobOutcome, JobRecord, JobStatus, QueueStats};

pub mod prelude {
    pub use crate::{
        processor_fn, JobContext, JobError, JobId, JobOutcome, JobRecord, JobStatus, Processor,
        QueueConfig, QueueError, QueueResult, QueueStats, Scheduler,
    };

    pub use async_trait::async_trait;
}
