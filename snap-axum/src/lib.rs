//! snap-axum: HTTP front end of the screenshot pipeline.
//!
//! Wires the `snap-queue` scheduler, rate limiter, janitor and callback
//! sender into an axum router and exposes the REST API.

pub mod app;
pub mod capture;
pub mod config;
pub mod dispatch;
pub mod params;
pub mod processor;
pub mod request;
pub mod rest;
pub mod state;
pub mod storage;
pub mod validation;
mod error;

pub use app::{build_router, serve, Pipeline};
pub use capture::{HttpRenderer, RenderRequest, RenderedImage, Renderer};
pub use config::{CaptureDefaults, ServerConfig};
pub use dispatch::CallbackDispatcher;
pub use error::{codes, ApiError};
pub use processor::{ScreenshotProcessor, ScreenshotResult};
pub use request::{CaptureSettings, ImageFormat, ScreenshotJob, ScreenshotRequest};
pub use state::{AppState, ScreenshotQueue};
pub use storage::{ImageStore, LocalImageStore};

pub use axum;
