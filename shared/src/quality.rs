//! Pre-flight image quality checks.
//!
//! Runs before any upload or model call so that unusable photos never cost
//! a paid request.

use std::io::Cursor;

use image::{ImageDecoder, ImageFormat, ImageReader};
use tracing::{debug, info};

use crate::config::QualityConfig;
use crate::{Error, Result};

/// What the gate learned about an accepted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Size of the decoded pixel buffer
    pub decoded_bytes: u64,
}

/// Validates uploads against format, resolution and size limits.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Check format, then resolution, then decoded size.
    ///
    /// The first failing check wins and its reason is returned as
    /// [`Error::Validation`]. Only the image header is read.
    pub fn validate(&self, bytes: &[u8]) -> Result<ImageInfo> {
        let format = image::guess_format(bytes).map_err(|_| {
            reject("无法识别图片格式，请使用 JPEG 或 PNG".to_string())
        })?;

        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            return Err(reject(format!(
                "不支持的图片格式: {:?}，请使用 JPEG 或 PNG",
                format
            )));
        }

        let decoder = ImageReader::with_format(Cursor::new(bytes), format)
            .into_decoder()
            .map_err(|e| reject(format!("图片无法解码: {}", e)))?;

        let (width, height) = decoder.dimensions();
        let min = self.config.min_resolution;
        if width < min || height < min {
            return Err(reject(format!(
                "图片分辨率过低 ({}x{})，至少需要 {}x{}",
                width, height, min, min
            )));
        }

        let decoded_bytes = decoder.total_bytes();
        if decoded_bytes > self.config.max_image_bytes {
            return Err(reject(format!(
                "图片文件过大，最大支持 {}MB",
                self.config.max_image_bytes / (1024 * 1024)
            )));
        }

        debug!(
            "Image accepted: {:?} {}x{} ({} decoded bytes)",
            format, width, height, decoded_bytes
        );

        Ok(ImageInfo {
            format,
            width,
            height,
            decoded_bytes,
        })
    }
}

fn reject(reason: String) -> Error {
    info!("Image rejected by quality gate: {}", reason);
    Error::Validation(format!("图片质量不符合要求: {}", reason))
}
