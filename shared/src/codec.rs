//! Image compression before upload.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::info;

use crate::Result;

/// Re-encodes an uploaded photo into something cheaper to store and send.
pub trait ImageCodec: Send + Sync {
    /// Fails on input that cannot be decoded.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Flattens to RGB, downsizes to a bounding box and encodes as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
    max_dimension: u32,
}

impl JpegCodec {
    pub fn new(quality: u8, max_dimension: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            max_dimension: max_dimension.max(1),
        }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(85, 2048)
    }
}

impl ImageCodec for JpegCodec {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut img = image::load_from_memory(bytes)?;

        let (width, height) = img.dimensions();
        if width > self.max_dimension || height > self.max_dimension {
            img = img.thumbnail(self.max_dimension, self.max_dimension);
        }

        let rgb = flatten(&img);
        let mut out = Cursor::new(Vec::new());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, self.quality))?;
        let compressed = out.into_inner();

        info!(
            "Compressed image {:.1}KB -> {:.1}KB",
            bytes.len() as f64 / 1024.0,
            compressed.len() as f64 / 1024.0
        );
        Ok(compressed)
    }
}

/// Composite any transparency onto a white background.
fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
