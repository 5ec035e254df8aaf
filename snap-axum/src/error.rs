use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use snap_queue::{QueueError, RateLimitInfo};

/// Machine-readable error codes
pub mod codes {
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const JOB_NOT_FOUND: &str = "JOB_NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";

    // Capture failures recorded on jobs
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const NAVIGATION_FAILED: &str = "NAVIGATION_FAILED";
    pub const SCREENSHOT_FAILED: &str = "SCREENSHOT_FAILED";
    pub const UPLOAD_FAILED: &str = "UPLOAD_FAILED";
}

/// Error returned by the HTTP handlers.
///
/// Renders as `{ "success": false, "error": { code, message, details? } }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            headers: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn rate_limited(info: &RateLimitInfo) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMIT_EXCEEDED,
            format!(
                "Too many requests. Please try again in {} seconds.",
                info.reset_in_secs
            ),
        )
        .with_details(json!(info));

        for (name, value) in [
            ("x-ratelimit-limit", info.limit.to_string()),
            ("x-ratelimit-remaining", info.remaining.to_string()),
            ("x-ratelimit-reset", info.reset_in_secs.to_string()),
        ] {
            if let Ok(value) = HeaderValue::from_str(&value) {
                err.headers.push((HeaderName::from_static(name), value));
            }
        }
        err
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::VALIDATION_ERROR, message)
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::JOB_NOT_FOUND,
            format!("Job with ID {job_id} not found"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL_ERROR, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::SERVICE_UNAVAILABLE,
            message,
        )
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Closed => Self::unavailable("Service is shutting down"),
            QueueError::DuplicateJob(id) => Self::internal("An internal server error occurred")
                .with_details(Value::String(format!("Job already exists: {id}"))),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": ErrorBody {
                code: self.code,
                message: &self.message,
                details: self.details.as_ref(),
            },
        });

        let mut response = (self.status, Json(body)).into_response();
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
