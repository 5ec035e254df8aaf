use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;
use crate::JobError;

/// Job status lifecycle
///
/// `Pending` and `Active` are transient, `Completed` and `Failed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a free slot, or for its retry delay to elapse
    Pending,

    /// An attempt is in flight
    Active,

    /// Processor succeeded
    Completed,

    /// Last allowed attempt failed
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Terminal result of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum JobOutcome<O> {
    Completed(O),
    Failed(JobError),
}

impl<O> JobOutcome<O> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Job record - runtime state owned by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord<I, O> {
    pub id: JobId,

    /// Processor-specific payload, opaque to the queue
    pub input: I,

    pub status: JobStatus,

    /// 0-100, non-decreasing within one attempt
    pub progress: u8,

    /// Present only once completed
    pub result: Option<O>,

    /// Error of the most recent failed attempt
    pub last_error: Option<JobError>,

    /// Attempts started so far
    pub attempts: u32,

    pub max_attempts: u32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,

    /// Set on both terminal outcomes
    pub completed_at: Option<DateTime<Utc>>,

    /// When a failed job re-enters the pending list (backoff in progress)
    pub retry_at: Option<DateTime<Utc>>,
}

impl<I, O> JobRecord<I, O> {
    /// Create a new pending job record
    pub fn new(id: JobId, input: I, max_attempts: u32) -> Self {
        Self {
            id,
            input,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            last_error: None,
            attempts: 0,
            max_attempts,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_at: None,
        }
    }

    /// Check if another attempt is allowed after a failure
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts && !self.status.is_terminal()
    }

    /// Check if the job is waiting out a retry delay
    pub fn is_backing_off(&self) -> bool {
        self.status == JobStatus::Pending && self.retry_at.is_some()
    }

    /// Start a new attempt
    pub fn start_attempt(&mut self) {
        self.status = JobStatus::Active;
        self.attempts += 1;
        self.progress = 0;
        self.started_at = Some(Utc::now());
        self.retry_at = None;
    }

    /// Raise progress; lower values and non-active jobs are ignored
    pub fn advance_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.status != JobStatus::Active || percent < self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    /// Complete the job successfully
    pub fn complete(&mut self, result: O) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    /// Fail the job permanently
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Failed;
        self.last_error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed attempt and park the job until `retry_at`
    pub fn schedule_retry(&mut self, error: JobError, retry_at: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.last_error = Some(error);
        self.retry_at = Some(retry_at);
    }

    /// Backoff elapsed, job is back in the pending list
    pub fn requeue(&mut self) {
        self.retry_at = None;
    }

    /// Check whether a terminal job finished before `cutoff`
    pub fn finished_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.status.is_terminal() && self.completed_at.is_some_and(|at| at < cutoff)
    }
}

impl<I, O: Clone> JobRecord<I, O> {
    /// Tagged terminal result, `None` while the job is transient
    pub fn outcome(&self) -> Option<JobOutcome<O>> {
        match self.status {
            JobStatus::Completed => self.result.clone().map(JobOutcome::Completed),
            JobStatus::Failed => Some(JobOutcome::Failed(
                self.last_error
                    .clone()
                    .unwrap_or_else(|| JobError::message("Unknown error")),
            )),
            _ => None,
        }
    }
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs in the pending list
    pub waiting: usize,
    /// Failed jobs waiting out their retry delay
    pub delayed: usize,
    /// Attempts in flight
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    /// Non-terminal jobs
    pub total: usize,
}
