use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snap_queue::{JobContext, JobError, Processor, ScreenshotInfo};
use tracing::{info, instrument};

use crate::capture::{RenderRequest, Renderer};
use crate::request::{ImageFormat, ScreenshotJob};
use crate::storage::ImageStore;

/// Output of a completed screenshot job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotResult {
    pub image_url: String,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub size: u64,
}

impl From<&ScreenshotResult> for ScreenshotInfo {
    fn from(result: &ScreenshotResult) -> Self {
        Self {
            url: result.image_url.clone(),
            format: result.format.to_string(),
            width: result.width,
            height: result.height,
            size: result.size,
        }
    }
}

/// Render, then store.
///
/// One attempt, no retries and no callbacks: the scheduler retries failed
/// attempts and the dispatcher reports terminal outcomes.
pub struct ScreenshotProcessor<R, S> {
    renderer: R,
    store: S,
    navigation_timeout: Duration,
}

impl<R, S> ScreenshotProcessor<R, S>
where
    R: Renderer,
    S: ImageStore,
{
    pub fn new(renderer: R, store: S, navigation_timeout: Duration) -> Self {
        Self {
            renderer,
            store,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl<R, S> Processor<ScreenshotJob, ScreenshotResult> for ScreenshotProcessor<R, S>
where
    R: Renderer,
    S: ImageStore,
{
    #[instrument(skip(self, ctx), fields(job_id = %ctx.job_id, attempt = ctx.attempt))]
    async fn process(&self, ctx: JobContext<ScreenshotJob>) -> Result<ScreenshotResult, JobError> {
        let job = &ctx.input;
        info!(target_url = %job.target_url, "processing screenshot job");
        ctx.progress.report(10);

        let request = RenderRequest::new(&job.target_url, &job.settings, self.navigation_timeout);
        let image = self.renderer.render(&request).await?;
        ctx.progress.report(40);

        let size = image.bytes.len() as u64;
        ctx.progress.report(70);

        let image_url = self.store.put(&ctx.job_id, &image.bytes, image.format).await?;
        ctx.progress.report(90);

        info!(image_url = %image_url, size, "screenshot stored");
        Ok(ScreenshotResult {
            image_url,
            format: image.format,
            width: image.width,
            height: image.height,
            size,
        })
    }
}
