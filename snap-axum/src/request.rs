//! Wire types of the submit endpoint and the job input derived from them.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::config::CaptureDefaults;
use crate::validation::FieldOrder;

/// Output image encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}

fn scheme_error(message: &'static str) -> ValidationError {
    let mut err = ValidationError::new("scheme");
    err.message = Some(Cow::Borrowed(message));
    err
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn target_scheme(value: &str) -> Result<(), ValidationError> {
    if is_http_url(value) {
        Ok(())
    } else {
        Err(scheme_error("URL must start with http:// or https://"))
    }
}

fn callback_scheme(value: &str) -> Result<(), ValidationError> {
    if is_http_url(value) {
        Ok(())
    } else {
        Err(scheme_error("Callback URL must start with http:// or https://"))
    }
}

/// Body of `POST /api/screenshot`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRequest {
    #[validate(
        url(message = "Invalid URL format"),
        custom(function = "target_scheme"),
        length(max = 2048, message = "URL too long (max 2048 characters)")
    )]
    pub target_url: String,

    #[validate(
        url(message = "Invalid callback URL format"),
        custom(function = "callback_scheme"),
        length(max = 2048, message = "Callback URL too long (max 2048 characters)")
    )]
    pub callback_url: String,

    #[serde(default)]
    #[validate(nested)]
    pub options: Option<CaptureOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    #[validate(nested)]
    pub viewport: Option<Viewport>,
    pub full_page: Option<bool>,
    pub format: Option<ImageFormat>,
    #[validate(range(min = 1, max = 100, message = "Quality must be between 1 and 100"))]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Viewport {
    #[validate(range(min = 320, max = 3840, message = "Viewport width must be between 320 and 3840"))]
    pub width: Option<u32>,
    #[validate(range(min = 240, max = 2160, message = "Viewport height must be between 240 and 2160"))]
    pub height: Option<u32>,
}

/// Fully resolved capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub full_page: bool,
    pub format: ImageFormat,
    pub quality: u32,
}

/// Input of a screenshot job as the scheduler stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotJob {
    pub target_url: String,
    pub callback_url: String,
    pub settings: CaptureSettings,
    /// Rate-limit identity of the submitter
    pub client_key: String,
}

impl FieldOrder for ScreenshotRequest {
    const FIELD_ORDER: &'static [&'static str] = &[
        "target_url",
        "callback_url",
        "options",
        "viewport",
        "full_page",
        "format",
        "quality",
        "width",
        "height",
    ];
}

impl ScreenshotRequest {
    /// Fill unset options from `defaults`
    pub fn into_job(self, defaults: &CaptureDefaults, client_key: impl Into<String>) -> ScreenshotJob {
        let options = self.options.unwrap_or_default();
        let viewport = options.viewport.unwrap_or_default();

        ScreenshotJob {
            target_url: self.target_url,
            callback_url: self.callback_url,
            settings: CaptureSettings {
                width: viewport.width.unwrap_or(defaults.width),
                height: viewport.height.unwrap_or(defaults.height),
                full_page: options.full_page.unwrap_or(defaults.full_page),
                format: options.format.unwrap_or(defaults.format),
                quality: options.quality.unwrap_or(u32::from(defaults.quality)),
            },
            client_key: client_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: serde_json::Value) -> ScreenshotRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn minimal_request_is_valid() {
        let req = parse(json!({
            "targetUrl": "https://example.com",
            "callbackUrl": "https://hooks.example.com/done"
        }));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let req = parse(json!({
            "targetUrl": "ftp://example.com/file",
            "callbackUrl": "https://hooks.example.com/done"
        }));
        let errs = req.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("target_url"));
    }

    #[test]
    fn overlong_url_is_rejected() {
        let long = format!("https://example.com/{}", "a".repeat(2048));
        let req = parse(json!({
            "targetUrl": long,
            "callbackUrl": "https://hooks.example.com/done"
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn option_ranges_are_enforced() {
        let req = parse(json!({
            "targetUrl": "https://example.com",
            "callbackUrl": "https://hooks.example.com/done",
            "options": { "viewport": { "width": 100, "height": 5000 }, "quality": 0 }
        }));
        assert!(req.validate().is_err());
    }

    #[test]
    fn unknown_format_fails_to_parse() {
        let parsed: Result<ScreenshotRequest, _> = serde_json::from_value(json!({
            "targetUrl": "https://example.com",
            "callbackUrl": "https://hooks.example.com/done",
            "options": { "format": "gif" }
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn defaults_fill_missing_options() {
        let req = parse(json!({
            "targetUrl": "https://example.com",
            "callbackUrl": "https://hooks.example.com/done",
            "options": { "viewport": { "width": 1280 }, "format": "webp" }
        }));
        let job = req.into_job(&CaptureDefaults::default(), "1.2.3.4");
        assert_eq!(job.settings.width, 1280);
        assert_eq!(job.settings.height, 1080);
        assert_eq!(job.settings.format, ImageFormat::Webp);
        assert_eq!(job.settings.quality, 80);
        assert!(job.settings.full_page);
        assert_eq!(job.client_key, "1.2.3.4");
    }

    #[test]
    fn format_parsing_accepts_aliases() {
        assert_eq!("JPG".parse::<ImageFormat>(), Ok(ImageFormat::Jpeg));
        assert!("bmp".parse::<ImageFormat>().is_err());
    }
}
