//! Image persistence capability.

use std::path::PathBuf;

use async_trait::async_trait;
use snap_queue::{JobError, JobId};
use tracing::debug;

use crate::error::codes;
use crate::request::ImageFormat;

/// Stores encoded images and hands back a public URL
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    async fn put(&self, job_id: &JobId, bytes: &[u8], format: ImageFormat) -> Result<String, JobError>;
}

/// Writes `{dir}/{job_id}.{format}` to local disk
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}

fn upload_failed(err: std::io::Error) -> JobError {
    JobError::new(codes::UPLOAD_FAILED, format!("Failed to upload image: {err}"))
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, job_id: &JobId, bytes: &[u8], format: ImageFormat) -> Result<String, JobError> {
        let file_name = format!("{job_id}.{format}");
        let path = self.dir.join(&file_name);

        tokio::fs::create_dir_all(&self.dir).await.map_err(upload_failed)?;
        tokio::fs::write(&path, bytes).await.map_err(upload_failed)?;
        debug!(path = %path.display(), size = bytes.len(), "stored image");

        Ok(format!("{}/{}", self.public_url, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn writes_file_and_returns_public_url() {
        let dir = scratch_dir("snap-store");
        let store = LocalImageStore::new(&dir, "http://localhost:3000/screenshots/");

        let url = store
            .put(&JobId::from("job-1"), b"image-bytes", ImageFormat::Webp)
            .await
            .unwrap();

        assert_eq!(url, "http://localhost:3000/screenshots/job-1.webp");
        let written = tokio::fs::read(dir.join("job-1.webp")).await.unwrap();
        assert_eq!(written, b"image-bytes");
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn unwritable_location_is_an_upload_failure() {
        // A regular file where the directory should be
        let blocker = scratch_dir("snap-store-blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let store = LocalImageStore::new(&blocker, "http://localhost/screenshots");

        let err = store
            .put(&JobId::from("job-2"), b"bytes", ImageFormat::Png)
            .await
            .unwrap_err();

        assert_eq!(err.code, codes::UPLOAD_FAILED);
        let _ = tokio::fs::remove_file(&blocker).await;
    }
}
