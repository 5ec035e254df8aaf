//! Webhook delivery of terminal job outcomes.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{config::CallbackConfig, error::CallbackError, JobError, JobId};

/// Terminal status carried by a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Completed,
    Failed,
}

/// Image details sent with a successful callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotInfo {
    pub url: String,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

/// Error details sent with a failed callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackErrorInfo {
    pub code: String,
    pub message: String,
}

impl From<&JobError> for CallbackErrorInfo {
    fn from(err: &JobError) -> Self {
        Self {
            code: err.code.clone(),
            message: err.message.clone(),
        }
    }
}

/// JSON body POSTed to the client's callback URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub job_id: JobId,
    pub status: CallbackStatus,
    pub target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CallbackErrorInfo>,
    pub completed_at: DateTime<Utc>,
}

impl CallbackPayload {
    pub fn completed(
        job_id: JobId,
        target_url: impl Into<String>,
        screenshot: ScreenshotInfo,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            status: CallbackStatus::Completed,
            target_url: target_url.into(),
            screenshot: Some(screenshot),
            error: None,
            completed_at,
        }
    }

    pub fn failed(
        job_id: JobId,
        target_url: impl Into<String>,
        error: &JobError,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            status: CallbackStatus::Failed,
            target_url: target_url.into(),
            screenshot: None,
            error: Some(error.into()),
            completed_at,
        }
    }
}

/// POSTs callback payloads with its own retry schedule, independent of the
/// job queue's retries.
#[derive(Debug, Clone)]
pub struct CallbackSender {
    client: Client,
    config: CallbackConfig,
}

impl CallbackSender {
    pub fn new(config: CallbackConfig) -> Result<Self, CallbackError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Deliver `payload` to `url`.
    ///
    /// `Ok(true)` on a 2xx, `Ok(false)` once retryable failures (5xx or
    /// transport errors) exhaust `max_retries`, `Err(Rejected)` on any other
    /// status without retrying.
    #[instrument(skip(self, payload), fields(job_id = %payload.job_id, status = ?payload.status))]
    pub async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<bool, CallbackError> {
        let max_attempts = self.config.max_retries.max(1) as usize;

        for attempt in 0..max_attempts {
            debug!(url = %url, attempt = attempt + 1, "sending callback");

            let retry_reason = match self.client.post(url).json(payload).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %url, status = response.status().as_u16(), "callback delivered");
                    return Ok(true);
                }
                Ok(response) if response.status().is_server_error() => {
                    format!("server responded {}", response.status().as_u16())
                }
                Ok(response) => {
                    let status = response.status();
                    error!(url = %url, status = status.as_u16(), "callback rejected");
                    return Err(rejected(status));
                }
                Err(err) => format!("transport error: {err}"),
            };

            if attempt + 1 < max_attempts {
                let delay = self.config.delay_after(attempt);
                warn!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    reason = %retry_reason,
                    "callback failed, retrying"
                );
                tokio::time::sleep(delay).await;
            } else {
                warn!(url = %url, attempt = attempt + 1, reason = %retry_reason, "callback attempt failed");
            }
        }

        error!(url = %url, attempts = max_attempts, "callback abandoned after all retries");
        Ok(false)
    }
}

fn rejected(status: StatusCode) -> CallbackError {
    CallbackError::Rejected {
        status: status.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_payload_serializes_camel_case() {
        let at = "2024-05-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let payload = CallbackPayload::completed(
            JobId::from("job-1"),
            "https://example.com",
            ScreenshotInfo {
                url: "http://localhost:3000/screenshots/job-1.png".into(),
                format: "png".into(),
                width: 1920,
                height: 1080,
                size: 2048,
            },
            at,
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["targetUrl"], "https://example.com");
        assert_eq!(json["screenshot"]["width"], 1920);
        assert_eq!(json["completedAt"], "2024-05-01T12:00:00Z");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_payload_carries_error() {
        let payload = CallbackPayload::failed(
            JobId::from("job-2"),
            "https://example.com",
            &JobError::new("TIMEOUT", "navigation timed out"),
            Utc::now(),
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["code"], "TIMEOUT");
        assert!(json.get("screenshot").is_none());
    }
}
