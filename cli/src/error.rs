use std::path::PathBuf;
use thiserror::Error;

use image_converter_core::intake::UploadError;
use image_converter_core::ConversionFailure;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to overwrite {0}; pass an explicit output path")]
    WouldOverwrite(PathBuf),

    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("{0}")]
    Conversion(#[from] ConversionFailure),
}
