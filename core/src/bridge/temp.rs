use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::DynamicImage;
use tempfile::TempPath;

use crate::error::ProcessingError;

/// A uniquely named file owned by exactly one conversion call.
///
/// The file is removed when the artifact is dropped, so every exit path
/// (including `?` early returns and panics) cleans up after itself.
#[derive(Debug)]
pub struct TempArtifact {
    path: TempPath,
}

impl TempArtifact {
    /// Create an empty file `conv_<random><suffix>` inside `dir`.
    pub fn create(dir: &Path, suffix: &str) -> Result<Self, ProcessingError> {
        let file = tempfile::Builder::new()
            .prefix("conv_")
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(dir)?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_bytes(&self, data: &[u8]) -> Result<(), ProcessingError> {
        fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn write_image(
        &self,
        img: &DynamicImage,
        format: image::ImageFormat,
    ) -> Result<(), ProcessingError> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        img.write_to(&mut writer, format)
            .map_err(|e| ProcessingError::Encode(format!("Failed to write intermediate image: {e}")))?;
        writer.flush()?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>, ProcessingError> {
        Ok(fs::read(&self.path)?)
    }

    /// Delete now and report failures instead of swallowing them in `Drop`.
    pub fn release(self) -> Result<(), ProcessingError> {
        self.path.close()?;
        Ok(())
    }
}

/// Replace artifact paths in captured tool output.
pub fn redact(text: &str, artifacts: &[&TempArtifact]) -> String {
    artifacts.iter().fold(text.to_string(), |acc, artifact| {
        acc.replace(&*artifact.path().to_string_lossy(), "<temp>")
    })
}
