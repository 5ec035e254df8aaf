//! Turns finished jobs into webhook deliveries.

use std::sync::Arc;

use chrono::Utc;
use snap_queue::{CallbackPayload, CallbackSender, JobError, JobRecord, JobStatus};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::codes;
use crate::processor::ScreenshotResult;
use crate::request::ScreenshotJob;

type ScreenshotRecord = JobRecord<ScreenshotJob, ScreenshotResult>;

/// Sends one callback per finished job.
///
/// Fed by the scheduler's finished-record stream, which never drops entries.
/// Each delivery runs on its own task so a long callback backoff never holds
/// up the stream. Delivery results are logged only; job state is final
/// by the time a callback is attempted.
#[derive(Clone)]
pub struct CallbackDispatcher {
    sender: Arc<CallbackSender>,
}

impl CallbackDispatcher {
    pub fn new(sender: CallbackSender) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Callback body for a terminal record, `None` while the job is transient
    pub fn payload_for(record: &ScreenshotRecord) -> Option<CallbackPayload> {
        let completed_at = record.completed_at.unwrap_or_else(Utc::now);
        let target_url = record.input.target_url.clone();

        match record.status {
            JobStatus::Completed => record.result.as_ref().map(|result| {
                CallbackPayload::completed(record.id.clone(), target_url, result.into(), completed_at)
            }),
            JobStatus::Failed => {
                let fallback = JobError::new(codes::SCREENSHOT_FAILED, "Unknown error");
                let error = record.last_error.as_ref().unwrap_or(&fallback);
                Some(CallbackPayload::failed(record.id.clone(), target_url, error, completed_at))
            }
            JobStatus::Pending | JobStatus::Active => None,
        }
    }

    /// Consume finished records until the queue closes
    pub fn spawn(self, mut finished: UnboundedReceiver<ScreenshotRecord>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(record) = finished.recv().await {
                self.handle(&record);
            }
            debug!("callback dispatcher stopped");
        })
    }

    fn handle(&self, record: &ScreenshotRecord) {
        let Some(payload) = Self::payload_for(record) else {
            return;
        };

        let sender = Arc::clone(&self.sender);
        let url = record.input.callback_url.clone();
        tokio::spawn(async move {
            match sender.send(&url, &payload).await {
                Ok(true) => info!(job_id = %payload.job_id, "callback sent"),
                Ok(false) => warn!(job_id = %payload.job_id, url = %url, "callback abandoned"),
                Err(err) => warn!(job_id = %payload.job_id, url = %url, error = %err, "callback rejected"),
            }
        });
    }
}
