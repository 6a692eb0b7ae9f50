//! Upload validation run before the engine sees any bytes.

use std::io::Cursor;

use image::ImageReader;
use thiserror::Error;

use crate::config::ConversionMode;
use crate::engine::ConversionRequest;
use crate::error::ProcessingError;
use crate::format::{sniff_mime, FormatRegistry, ImageFormat};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Please upload an image.")]
    Empty,

    #[error("Max file size is {limit_mb}MB.")]
    TooLarge { limit_mb: usize },

    #[error("Allowed extensions: {allowed}")]
    Extension { allowed: String },

    #[error("Invalid MIME type: {0}")]
    Mime(String),

    #[error("The uploaded file is not a real image.")]
    NotAnImage,

    #[error("Unsupported output format.")]
    OutputFormat,
}

/// Bytes that passed every intake check, tagged with their sniffed type.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    /// Lower-cased extension from the client's file name.
    pub ext: String,
    pub mime: &'static str,
    pub format: ImageFormat,
}

impl ValidatedUpload {
    pub fn base_name(&self) -> String {
        let stem = match self.file_name.rfind('.') {
            Some(idx) => &self.file_name[..idx],
            None => self.file_name.as_str(),
        };
        sanitize_base_name(stem)
    }

    /// Suggested name for the produced file.
    pub fn download_name(&self, mode: ConversionMode, target: ImageFormat) -> String {
        match mode {
            ConversionMode::Compress => format!("{}_compressed.{}", self.base_name(), self.ext),
            ConversionMode::Convert => format!("{}.{}", self.base_name(), target.extension()),
        }
    }

    pub fn into_convert_request(self, target: ImageFormat, quality: Option<i64>) -> ConversionRequest {
        ConversionRequest::convert(self.bytes, self.mime, self.ext, target, quality)
    }

    pub fn into_compress_request(self, quality: Option<i64>) -> Result<ConversionRequest, ProcessingError> {
        ConversionRequest::compress(self.bytes, self.mime, self.ext, quality)
    }
}

/// Check size, extension, declared MIME and sniffed content against `registry`.
///
/// `declared_mime` is whatever the client claimed; `application/octet-stream`
/// and absent values are treated as "no claim".
pub fn validate_upload(
    registry: &FormatRegistry,
    file_name: &str,
    declared_mime: Option<&str>,
    bytes: Vec<u8>,
) -> Result<ValidatedUpload, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }

    if bytes.len() > registry.max_upload_bytes() {
        return Err(UploadError::TooLarge {
            limit_mb: registry.max_upload_bytes() / 1024 / 1024,
        });
    }

    let ext = extension_of(file_name);
    let ext_allowed = ImageFormat::from_extension(&ext).is_some_and(|f| registry.inputs().contains(&f));
    if !ext_allowed {
        return Err(UploadError::Extension {
            allowed: registry.describe_inputs(),
        });
    }

    if let Some(declared) = declared_mime.filter(|m| !is_unspecified(m)) {
        if !registry.is_allowed_input(&ext, declared) {
            return Err(UploadError::Mime(declared.to_string()));
        }
    }

    let mime = sniff_mime(&bytes).ok_or_else(|| UploadError::Mime("unknown".to_string()))?;
    if !registry.is_allowed_input(&ext, mime) {
        return Err(UploadError::Mime(mime.to_string()));
    }
    let format = ImageFormat::from_mime(mime).ok_or_else(|| UploadError::Mime(mime.to_string()))?;

    if matches!(format, ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif) && !has_dimensions(&bytes) {
        return Err(UploadError::NotAnImage);
    }

    Ok(ValidatedUpload {
        bytes,
        file_name: file_name.to_string(),
        ext,
        mime,
        format,
    })
}

/// Parse a requested output format against the registry.
pub fn parse_output_format(registry: &FormatRegistry, raw: &str) -> Result<ImageFormat, UploadError> {
    ImageFormat::from_extension(raw.trim())
        .filter(|f| registry.is_allowed_output(*f))
        .ok_or(UploadError::OutputFormat)
}

/// Replace every run of characters outside `[A-Za-z0-9_-]` with `_`.
/// Empty results become `image`.
pub fn sanitize_base_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() {
        "image".to_string()
    } else {
        out
    }
}

fn extension_of(file_name: &str) -> String {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match name.rfind('.') {
        Some(idx) => name[idx + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

fn is_unspecified(mime: &str) -> bool {
    let mime = mime.trim();
    mime.is_empty() || mime.eq_ignore_ascii_case("application/octet-stream")
}

fn has_dimensions(bytes: &[u8]) -> bool {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .is_some_and(|(w, h)| w > 0 && h > 0)
}
