use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobRecord};
use crate::JobError;

/// Lifecycle events broadcast by the scheduler
///
/// Terminal events carry a snapshot of the finished record so subscribers
/// (the callback dispatcher in particular) never race the janitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent<I, O> {
    /// Job was submitted
    Enqueued {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// An attempt took a worker slot
    Started {
        job_id: JobId,
        attempt: u32,
        at: DateTime<Utc>,
    },

    /// An attempt failed and the job will be re-enqueued at `retry_at`
    Retrying {
        job_id: JobId,
        attempt: u32,
        retry_at: DateTime<Utc>,
        error: JobError,
    },

    /// Job completed successfully
    Completed(JobRecord<I, O>),

    /// Job failed permanently
    Failed(JobRecord<I, O>),
}

impl<I, O> JobEvent<I, O> {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Started { .. } => "started",
            Self::Retrying { .. } => "retrying",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. } => job_id,
            Self::Started { job_id, .. } => job_id,
            Self::Retrying { job_id, .. } => job_id,
            Self::Completed(record) | Self::Failed(record) => &record.id,
        }
    }

    /// Finished record, for terminal events only
    pub fn terminal_record(&self) -> Option<&JobRecord<I, O>> {
        match self {
            Self::Completed(record) | Self::Failed(record) => Some(record),
            _ => None,
        }
    }
}
