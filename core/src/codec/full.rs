//! Full-featured backend: `image` crate codecs plus libwebp for lossy WebP,
//! rav1e (through `image`) for AVIF and oxipng for lossless PNG shrinking.

use std::io::Cursor;

use image::codecs::avif::AvifEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};

use super::backend::{encode_gif, encode_jpeg, encode_png, RasterBackend};
use crate::config::{BackendKind, Quality};
use crate::error::ProcessingError;
use crate::format::ImageFormat;

/// rav1e speed 1-10; 8 keeps request latency reasonable.
const AVIF_SPEED: u8 = 8;

pub struct FullBackend {
    png_level: u8,
}

impl FullBackend {
    pub fn new(png_optimization_level: u8) -> Self {
        Self {
            png_level: png_optimization_level.min(6),
        }
    }
}

const ENCODE_TABLE: &[(ImageFormat, bool)] = &[
    (ImageFormat::Jpeg, true),
    (ImageFormat::Png, true),
    (ImageFormat::Gif, true),
    (ImageFormat::Webp, true),
    (ImageFormat::Avif, true),
];

impl RasterBackend for FullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Full
    }

    fn encode_table(&self) -> &'static [(ImageFormat, bool)] {
        ENCODE_TABLE
    }

    fn encode_named(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ProcessingError> {
        match format {
            ImageFormat::Jpeg => encode_jpeg(img, quality),
            ImageFormat::Png => self.encode_optimized_png(img),
            ImageFormat::Gif => encode_gif(img),
            ImageFormat::Webp => encode_webp(img, quality),
            ImageFormat::Avif => encode_avif(img, quality),
            ImageFormat::Svg => Err(ProcessingError::UnsupportedFormat(
                "SVG is not a raster format".to_string(),
            )),
        }
    }
}

impl FullBackend {
    /// Lossless DEFLATE re-compression + metadata stripping via oxipng
    fn encode_optimized_png(&self, img: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
        let png = encode_png(img)?;

        let mut opts = oxipng::Options::from_preset(self.png_level);
        opts.strip = oxipng::StripChunks::Safe;

        match oxipng::optimize_from_memory(&png, &opts) {
            Ok(optimized) if optimized.len() < png.len() => Ok(optimized),
            Ok(_) => Ok(png),
            Err(e) => {
                log::warn!("oxipng failed, keeping unoptimized PNG: {e}");
                Ok(png)
            }
        }
    }
}

fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, ProcessingError> {
    let (width, height) = img.dimensions();

    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height).encode(quality.value() as f32)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height).encode(quality.value() as f32)
    };

    if encoded.is_empty() {
        return Err(ProcessingError::Encode("libwebp produced no output".to_string()));
    }
    Ok(encoded.to_vec())
}

fn encode_avif(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, ProcessingError> {
    let rgba = img.to_rgba8();

    let mut output = Vec::new();
    let encoder =
        AvifEncoder::new_with_speed_quality(Cursor::new(&mut output), AVIF_SPEED, quality.value());
    encoder
        .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
        .map_err(|e| ProcessingError::Encode(format!("Failed to encode AVIF: {e}")))?;

    Ok(output)
}
