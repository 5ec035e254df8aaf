use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use snap_queue::{CallbackErrorInfo, JobId, JobStatus, QueueStats, RateLimitInfo, ScreenshotInfo};
use tracing::{info, instrument, warn};

use crate::{
    error::ApiError, params::client_key, request::ScreenshotRequest, validation, AppState,
};

/// 202 body of a successful submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub job_id: JobId,
    pub status: &'static str,
    pub message: &'static str,
    pub estimated_time: &'static str,
    pub status_url: String,
}

/// Body of `GET /api/screenshot/{jobId}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: &'static str,
    pub progress: u8,
    pub attempts: u32,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CallbackErrorInfo>,
}

/// Client-facing status name; `active` reads as `processing`
fn public_status(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Active => "processing",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn map_json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::validation("Failed to parse the request body as JSON")
        .with_details(json!([{ "path": "_schema", "code": "parse", "message": rejection.body_text() }]))
}

/// Limiter errors never block intake
async fn admit(state: &AppState, key: &str) -> Result<(), ApiError> {
    let allowed = match state.limiter.check(key).await {
        Ok(allowed) => allowed,
        Err(err) => {
            warn!(key = %key, error = %err, "rate limiter unavailable, allowing request");
            return Ok(());
        }
    };
    if allowed {
        return Ok(());
    }

    let info = state.limiter.info(key).await.unwrap_or_else(|err| {
        warn!(key = %key, error = %err, "rate limit info unavailable");
        RateLimitInfo::default()
    });
    warn!(key = %key, count = info.count, limit = info.limit, "rate limit exceeded");
    Err(ApiError::rate_limited(&info))
}

#[instrument(skip_all)]
async fn create_screenshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let key = client_key(&headers);
    admit(&state, &key).await?;

    let Json(body) = body.map_err(map_json_rejection)?;
    let request: ScreenshotRequest = validation::validate(body)?;
    let job = request.into_job(&state.config.capture, key);

    let record = state.queue.submit(job)?;
    info!(job_id = %record.id, target_url = %record.input.target_url, "screenshot job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            success: true,
            status_url: format!("/api/screenshot/{}", record.id),
            job_id: record.id,
            status: "pending",
            message: "Screenshot job created successfully",
            estimated_time: "5-10 seconds",
        }),
    ))
}

async fn get_screenshot(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let record = state
        .queue
        .get_job(&JobId::from(job_id.as_str()))
        .ok_or_else(|| ApiError::job_not_found(&job_id))?;

    let screenshot = match record.status {
        JobStatus::Completed => record.result.as_ref().map(ScreenshotInfo::from),
        _ => None,
    };
    let error = match record.status {
        JobStatus::Failed => record.last_error.as_ref().map(CallbackErrorInfo::from),
        _ => None,
    };

    Ok(Json(JobStatusResponse {
        job_id: record.id,
        status: public_status(record.status),
        progress: record.progress,
        attempts: record.attempts,
        target_url: record.input.target_url,
        created_at: record.created_at,
        started_at: record.started_at,
        completed_at: record.completed_at,
        screenshot,
        error,
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let up = !state.queue.is_closed();
    let stats: QueueStats = state.queue.stats();

    let status = if up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if up { "healthy" } else { "unhealthy" },
            "timestamp": Utc::now(),
            "services": {
                "queue": {
                    "status": if up { "up" } else { "down" },
                    "stats": stats,
                }
            }
        })),
    )
}

async fn callback_dummy(body: Result<Json<Value>, JsonRejection>) -> (StatusCode, Json<Value>) {
    match body {
        Ok(Json(body)) => {
            info!(job_id = ?body.get("jobId"), status = ?body.get("status"), "dummy callback received");
            (
                StatusCode::OK,
                Json(json!({ "success": true, "message": "Callback received" })),
            )
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Invalid callback payload" })),
        ),
    }
}

/// API routes, state applied
pub fn api_router(state: AppState) -> Router<()> {
    Router::new()
        .route("/api/screenshot", post(create_screenshot))
        .route("/api/screenshot/{job_id}", get(get_screenshot))
        .route("/api/health", get(health))
        .route("/api/callback-dummy", post(callback_dummy))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_reads_as_processing() {
        assert_eq!(public_status(JobStatus::Active), "processing");
        assert_eq!(public_status(JobStatus::Pending), "pending");
        assert_eq!(public_status(JobStatus::Failed), "failed");
    }
}
