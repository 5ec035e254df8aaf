//! Page rendering capability.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::HeaderMap, Client};
use serde::{Deserialize, Serialize};
use snap_queue::JobError;
use tracing::debug;

use crate::error::codes;
use crate::request::{CaptureSettings, ImageFormat};

/// What to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub full_page: bool,
    pub format: ImageFormat,
    pub quality: u32,
    pub timeout_ms: u64,
}

impl RenderRequest {
    pub fn new(url: impl Into<String>, settings: &CaptureSettings, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            width: settings.width,
            height: settings.height,
            full_page: settings.full_page,
            format: settings.format,
            quality: settings.quality,
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Encoded image plus its dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Turns a URL into image bytes.
///
/// Implementations enforce their own navigation timeout and report it as a
/// `TIMEOUT` job error.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedImage, JobError>;
}

/// Error body a render service may answer with
#[derive(Debug, Deserialize)]
struct RenderFailure {
    code: String,
    message: String,
}

/// Delegates rendering to a headless-browser service over HTTP.
///
/// The service receives the [`RenderRequest`] as JSON and answers with the raw
/// image, reporting dimensions in `x-image-width` / `x-image-height`.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRenderer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> JobError {
        if err.is_timeout() {
            JobError::new(
                codes::TIMEOUT,
                format!("Page loading timeout after {} seconds", self.timeout.as_secs()),
            )
        } else if err.is_connect() {
            JobError::new(codes::NAVIGATION_FAILED, format!("Cannot navigate to URL: {err}"))
        } else {
            JobError::new(codes::SCREENSHOT_FAILED, err.to_string())
        }
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedImage, JobError> {
        debug!(url = %request.url, endpoint = %self.endpoint, "requesting render");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<RenderFailure>(&body) {
                Ok(failure) => JobError::new(failure.code, failure.message),
                Err(_) => JobError::new(
                    codes::SCREENSHOT_FAILED,
                    format!("Render service responded {}", status.as_u16()),
                ),
            });
        }

        let width = header_u32(response.headers(), "x-image-width").unwrap_or(request.width);
        let height = header_u32(response.headers(), "x-image-height").unwrap_or(request.height);
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;

        if bytes.is_empty() {
            return Err(JobError::new(
                codes::SCREENSHOT_FAILED,
                "Render service returned an empty image",
            ));
        }

        Ok(RenderedImage {
            bytes,
            width,
            height,
            format: request.format,
        })
    }
}
