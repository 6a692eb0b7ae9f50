use image::DynamicImage;

use super::backend::{encode_gif, encode_jpeg, encode_png, RasterBackend};
use crate::config::{BackendKind, Quality};
use crate::error::ProcessingError;
use crate::format::ImageFormat;

/// Fallback backend built from the `image` crate alone.
///
/// WebP and AVIF have no named encoder here and go through the generic
/// by-extension path, which does not honour the quality setting.
pub struct MinimalBackend;

const ENCODE_TABLE: &[(ImageFormat, bool)] = &[
    (ImageFormat::Jpeg, true),
    (ImageFormat::Png, true),
    (ImageFormat::Gif, true),
    (ImageFormat::Webp, false),
    (ImageFormat::Avif, false),
];

impl RasterBackend for MinimalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Minimal
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
            ImageFormat::Png => encode_png(img),
            ImageFormat::Gif => encode_gif(img),
            other => Err(ProcessingError::UnsupportedFormat(format!(
                "minimal backend has no {} encoder",
                other.as_str()
            ))),
        }
    }
}
