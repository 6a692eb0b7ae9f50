//! Raster backend trait and the encoders both backends share.
//!
//! A backend advertises an explicit encode table: for each raster format,
//! whether it has a dedicated ("named") encoder that honours the quality
//! setting. [`super::RasterCodec`] consults the table before dispatching and
//! otherwise falls back to the `image` crate's by-extension path.

use std::io::Cursor;

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};

use crate::config::{BackendKind, Quality};
use crate::error::ProcessingError;
use crate::format::ImageFormat;

pub trait RasterBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `(format, has named encoder)` for every raster format.
    fn encode_table(&self) -> &'static [(ImageFormat, bool)];

    /// Encode with the named encoder for `format`. Only called when the
    /// encode table says one exists.
    fn encode_named(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, ProcessingError>;

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessingError> {
        decode_any(data)
    }

    fn has_named_encoder(&self, format: ImageFormat) -> bool {
        self.encode_table()
            .iter()
            .any(|(f, named)| *f == format && *named)
    }
}

/// Decode any raster kind the `image` crate recognises by magic bytes.
pub fn decode_any(data: &[u8]) -> Result<DynamicImage, ProcessingError> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;

    if reader.format().is_none() {
        return Err(ProcessingError::Decode("unrecognized image data".to_string()));
    }

    reader
        .decode()
        .map_err(|e| ProcessingError::Decode(e.to_string()))
}

pub fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, ProcessingError> {
    // JPEG has no alpha; callers flatten beforehand
    let rgb = img.to_rgb8();

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.value());
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| ProcessingError::Encode(format!("Failed to encode JPEG: {e}")))?;

    Ok(output)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
    let mut output = Vec::new();
    let encoder = PngEncoder::new(&mut output);

    let written = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
    } else {
        let rgb = img.to_rgb8();
        encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
    };
    written.map_err(|e| ProcessingError::Encode(format!("Failed to encode PNG: {e}")))?;

    Ok(output)
}

pub fn encode_gif(img: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
    let rgba = img.to_rgba8();

    let mut output = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut output);
        encoder
            .encode(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
            .map_err(|e| ProcessingError::Encode(format!("Failed to encode GIF: {e}")))?;
    }

    Ok(output)
}
