//! Raster decode/encode behind one of two interchangeable backends.
//!
//! - [`full::FullBackend`]: named encoders for every raster format (libwebp,
//!   rav1e, oxipng). Compiled with the `full-backend` feature.
//! - [`minimal::MinimalBackend`]: `image` crate only.
//!
//! Dispatch checks the backend's encode table first. Formats without a
//! named encoder are written through the `image` crate's by-extension path
//! before the codec gives up.

pub mod backend;
#[cfg(feature = "full-backend")]
pub mod full;
pub mod minimal;

use std::borrow::Cow;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

use crate::config::{BackendKind, Capabilities, EngineConfig, Quality};
use crate::error::ProcessingError;
use crate::format::ImageFormat;
use backend::RasterBackend;

pub const WHITE: [u8; 3] = [255, 255, 255];

pub struct RasterCodec {
    backend: Box<dyn RasterBackend>,
}

impl RasterCodec {
    pub fn new(capabilities: &Capabilities, config: &EngineConfig) -> Self {
        Self::with_backend(select_backend(capabilities.backend, config))
    }

    pub fn with_backend(backend: Box<dyn RasterBackend>) -> Self {
        Self { backend }
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessingError> {
        self.backend.decode(data)
    }

    /// Encode `img` as `format`. Quality only matters for lossy formats.
    /// Transparent pixels are flattened onto white for formats without alpha.
    pub fn encode(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ProcessingError> {
        if format.is_vector() {
            return Err(ProcessingError::UnsupportedFormat(format!(
                "{} is not a raster format",
                format.as_str()
            )));
        }

        let img: Cow<'_, DynamicImage> = if !format.supports_alpha() && img.color().has_alpha() {
            Cow::Owned(DynamicImage::ImageRgb8(flatten_alpha(img, WHITE)))
        } else {
            Cow::Borrowed(img)
        };

        if self.backend.has_named_encoder(format) {
            log::debug!(
                "Encoding {} via {} backend (quality {})",
                format.as_str(),
                self.backend.kind().as_str(),
                quality.value()
            );
            return self.backend.encode_named(&img, format, quality);
        }

        log::debug!(
            "{} backend has no named {} encoder, encoding by extension",
            self.backend.kind().as_str(),
            format.as_str()
        );
        encode_by_extension(&img, format)
    }
}

#[cfg_attr(not(feature = "full-backend"), allow(unused_variables))]
fn select_backend(kind: BackendKind, config: &EngineConfig) -> Box<dyn RasterBackend> {
    match kind {
        #[cfg(feature = "full-backend")]
        BackendKind::Full => Box::new(full::FullBackend::new(config.png_optimization_level)),
        _ => Box::new(minimal::MinimalBackend),
    }
}

/// Generic `image` crate writer picked from the file extension.
fn encode_by_extension(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ProcessingError> {
    let target = image::ImageFormat::from_extension(format.extension())
        .filter(|f| f.writing_enabled())
        .ok_or_else(|| {
            ProcessingError::Encode(format!("no encoder available for {}", format.as_str()))
        })?;

    // The generic writers only accept 8-bit RGB(A)
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    let mut output = Vec::new();
    normalized
        .write_to(&mut Cursor::new(&mut output), target)
        .map_err(|e| ProcessingError::Encode(format!("Failed to encode {}: {e}", format.as_str())))?;

    Ok(output)
}

/// Composite every pixel over an opaque background colour.
pub fn flatten_alpha(img: &DynamicImage, background: [u8; 3]) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let blend = |c: u8, bg: u8| ((c as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8;
        image::Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// Largest size within `max` x `max` keeping the aspect ratio.
/// Images already inside the bound are returned unchanged.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    if width >= height {
        let h = (max as f64 / width as f64 * height as f64).round().max(1.0) as u32;
        (max, h)
    } else {
        let w = (max as f64 / height as f64 * width as f64).round().max(1.0) as u32;
        (w, max)
    }
}

/// Downscale so neither side exceeds `max`; never upscales.
pub fn downscale_to_fit(img: DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = fit_within(img.width(), img.height(), max);
    if (w, h) == (img.width(), img.height()) {
        return img;
    }
    log::debug!("Downscaling {}x{} to {}x{}", img.width(), img.height(), w, h);
    img.resize_exact(w, h, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn half_transparent() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within(800, 600, 1600), (800, 600));
        assert_eq!(fit_within(1600, 1600, 1600), (1600, 1600));
    }

    #[test]
    fn fit_within_scales_the_longer_side() {
        assert_eq!(fit_within(2000, 1000, 1600), (1600, 800));
        assert_eq!(fit_within(1000, 4000, 1600), (400, 1600));
        assert_eq!(fit_within(10000, 1, 1600), (1600, 1));
    }

    #[test]
    fn flatten_puts_transparency_on_white() {
        let flat = flatten_alpha(&half_transparent(), WHITE);
        assert_eq!(flat.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(flat.get_pixel(15, 5).0, [255, 255, 255]);
    }

    #[test]
    fn minimal_backend_encodes_webp_by_extension() {
        let codec = RasterCodec::with_backend(Box::new(minimal::MinimalBackend));
        let bytes = codec
            .encode(&half_transparent(), ImageFormat::Webp, Quality::new(50))
            .unwrap();
        assert_eq!(&bytes[8..12], b"WEBP");
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (20, 10));
    }

    #[test]
    fn jpeg_encode_flattens_alpha() {
        let codec = RasterCodec::with_backend(Box::new(minimal::MinimalBackend));
        let bytes = codec
            .encode(&half_transparent(), ImageFormat::Jpeg, Quality::new(95))
            .unwrap();
        let decoded = codec.decode(&bytes).unwrap().to_rgb8();
        let px = decoded.get_pixel(17, 5).0;
        assert!(px.iter().all(|c| *c > 240), "{px:?}");
    }

    #[test]
    fn svg_is_not_a_raster_target() {
        let codec = RasterCodec::with_backend(Box::new(minimal::MinimalBackend));
        let err = codec
            .encode(&half_transparent(), ImageFormat::Svg, Quality::default())
            .unwrap_err();
        assert!(matches!(err, ProcessingError::UnsupportedFormat(_)));
    }

    #[test]
    fn backend_follows_capability_snapshot() {
        let config = EngineConfig::default();
        assert_eq!(select_backend(BackendKind::Minimal, &config).kind(), BackendKind::Minimal);

        let expected = if cfg!(feature = "full-backend") {
            BackendKind::Full
        } else {
            BackendKind::Minimal
        };
        assert_eq!(select_backend(BackendKind::Full, &config).kind(), expected);
    }

    #[test]
    fn downscale_never_upscales() {
        let img = half_transparent();
        let same = downscale_to_fit(img, 1600);
        assert_eq!(same.dimensions(), (20, 10));
        let smaller = downscale_to_fit(same, 10);
        assert_eq!(smaller.dimensions(), (10, 5));
    }
}
