use std::ffi::OsString;
use std::path::Path;

use image::DynamicImage;

use super::temp::{redact, TempArtifact};
use super::tool::ExternalTool;
use crate::codec::{flatten_alpha, WHITE};
use crate::error::ProcessingError;

/// Trace `img` with potrace and return the SVG document.
///
/// potrace only reads bitmap formats, so the image is written to a
/// temporary 24-bit BMP first. Both the BMP and the SVG output file are
/// uniquely named per call and removed on every exit path.
pub fn trace_with_tool(
    tool: &dyn ExternalTool,
    img: &DynamicImage,
    temp_dir: &Path,
) -> Result<Vec<u8>, ProcessingError> {
    std::fs::create_dir_all(temp_dir)?;
    let bitmap = TempArtifact::create(temp_dir, ".bmp")?;
    let vector = TempArtifact::create(temp_dir, ".svg")?;

    // Transparent areas would otherwise trace as black
    let opaque = DynamicImage::ImageRgb8(flatten_alpha(img, WHITE));
    bitmap.write_image(&opaque, image::ImageFormat::Bmp)?;

    let args: Vec<OsString> = vec![
        bitmap.path().as_os_str().to_owned(),
        "-s".into(),
        "-o".into(),
        vector.path().as_os_str().to_owned(),
    ];

    let failed = |reason: String, output: &str| ProcessingError::ToolExecutionFailed {
        tool: tool.name().to_string(),
        reason,
        output: redact(output, &[&bitmap, &vector]),
    };

    let output = match tool.run(&args) {
        Ok(output) => output,
        Err(ProcessingError::ToolExecutionFailed { reason, output, .. }) => {
            return Err(failed(reason, &output));
        }
        Err(other) => return Err(other),
    };

    if !output.success() {
        return Err(failed(output.describe_status(), &output.diagnostics()));
    }

    let svg = vector.read()?;
    if svg.is_empty() {
        return Err(failed("produced no SVG output".to_string(), &output.diagnostics()));
    }

    for artifact in [bitmap, vector] {
        if let Err(e) = artifact.release() {
            log::warn!("Failed to remove vectorizer temp file: {e}");
        }
    }
    Ok(svg)
}
