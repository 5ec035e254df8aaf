use std::future::Future;
use std::sync::Weak;

use async_trait::async_trait;

use crate::{JobError, JobId};

/// The work a job performs.
///
/// A processor is a single async call: it owns no retry logic (the scheduler
/// does) and is expected to enforce its own operation timeouts, surfacing
/// them as ordinary `JobError`s.
#[async_trait]
pub trait Processor<I, O>: Send + Sync + 'static {
    async fn process(&self, ctx: JobContext<I>) -> Result<O, JobError>;
}

/// Everything an attempt gets to see
#[derive(Debug, Clone)]
pub struct JobContext<I> {
    pub job_id: JobId,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    pub input: I,
    pub progress: ProgressReporter,
}

pub(crate) trait ProgressSink: Send + Sync {
    fn report(&self, job_id: &JobId, attempt: u32, percent: u8);
}

/// Progress handle bound to one attempt of one job.
///
/// Reports arriving after the attempt settled, or from a superseded attempt,
/// are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Option<Weak<dyn ProgressSink>>,
    job_id: JobId,
    attempt: u32,
}

impl ProgressReporter {
    pub(crate) fn new(sink: Weak<dyn ProgressSink>, job_id: JobId, attempt: u32) -> Self {
        Self {
            sink: Some(sink),
            job_id,
            attempt,
        }
    }

    /// Reporter that discards everything (useful when calling a processor directly)
    pub fn detached(job_id: JobId) -> Self {
        Self {
            sink: None,
            job_id,
            attempt: 0,
        }
    }

    pub fn report(&self, percent: u8) {
        if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
            sink.report(&self.job_id, self.attempt, percent);
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Adapter turning an async closure into a [`Processor`]
pub struct FnProcessor<F>(F);

/// Wrap an async closure as a processor
pub fn processor_fn<F>(f: F) -> FnProcessor<F> {
    FnProcessor(f)
}

#[async_trait]
impl<I, O, F, Fut> Processor<I, O> for FnProcessor<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(JobContext<I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, JobError>> + Send + 'static,
{
    async fn process(&self, ctx: JobContext<I>) -> Result<O, JobError> {
        (self.0)(ctx).await
    }
}
