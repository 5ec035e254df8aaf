use std::env;
use std::path::PathBuf;
use std::time::Duration;

use snap_queue::config::{env_ms_or, env_or};
use snap_queue::PipelineConfig;

use crate::request::ImageFormat;

/// Defaults applied to fields a request leaves out
#[derive(Debug, Clone)]
pub struct CaptureDefaults {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub quality: u8,
    pub full_page: bool,
    pub navigation_timeout: Duration,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            format: ImageFormat::Png,
            quality: 80,
            full_page: true,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL of this API
    pub api_base_url: String,
    /// Endpoint of the headless-browser render service
    pub render_service_url: String,
    /// Directory the local image store writes into
    pub storage_dir: PathBuf,
    /// URL prefix under which stored images are served
    pub storage_public_url: String,
    pub capture: CaptureDefaults,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let api_base_url = "http://localhost:3000".to_string();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            storage_public_url: format!("{api_base_url}/screenshots"),
            api_base_url,
            render_service_url: "http://localhost:9222/render".to_string(),
            storage_dir: PathBuf::from("public/screenshots"),
            capture: CaptureDefaults::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let api_base_url = env::var("API_BASE_URL").unwrap_or(d.api_base_url);
        let storage_public_url =
            env::var("STORAGE_PUBLIC_URL").unwrap_or_else(|_| format!("{api_base_url}/screenshots"));

        let format = env::var("SCREENSHOT_DEFAULT_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(d.capture.format);

        Self {
            host: env::var("HOST").unwrap_or(d.host),
            port: env_or("PORT", d.port),
            api_base_url,
            render_service_url: env::var("RENDER_SERVICE_URL").unwrap_or(d.render_service_url),
            storage_dir: env::var("STORAGE_LOCAL_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.storage_dir),
            storage_public_url,
            capture: CaptureDefaults {
                width: env_or("SCREENSHOT_DEFAULT_WIDTH", d.capture.width),
                height: env_or("SCREENSHOT_DEFAULT_HEIGHT", d.capture.height),
                format,
                quality: env_or("SCREENSHOT_DEFAULT_QUALITY", d.capture.quality),
                full_page: env_or("SCREENSHOT_DEFAULT_FULL_PAGE", d.capture.full_page),
                navigation_timeout: env_ms_or(
                    "SCREENSHOT_NAVIGATION_TIMEOUT_MS",
                    d.capture.navigation_timeout,
                ),
            },
            pipeline: PipelineConfig::from_env(),
        }
    }

    /// `host:port` to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
