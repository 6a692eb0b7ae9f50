//! SVG rendering: in-process through resvg, or through `rsvg-convert`.

use std::ffi::OsString;
use std::path::Path;

use image::DynamicImage;

use super::temp::{redact, TempArtifact};
use super::tool::ExternalTool;
use crate::codec::backend::decode_any;
use crate::error::ProcessingError;

/// Which renderer produced the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renderer {
    InProcess,
    ExternalTool,
}

/// Render at `scale` times the SVG's natural size, then bounded by `max_dimension`.
#[cfg(feature = "svg-render")]
pub fn render_in_process(
    svg: &[u8],
    scale: f32,
    max_dimension: u32,
) -> Result<DynamicImage, ProcessingError> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_data(svg, &usvg::Options::default())
        .map_err(|e| ProcessingError::Decode(format!("invalid SVG: {e}")))?;

    let size = tree.size();
    if size.width().ceil() < 1.0 || size.height().ceil() < 1.0 {
        return Err(ProcessingError::Decode("SVG has an empty canvas".to_string()));
    }
    let scaled_w = (size.width() * scale).ceil().max(1.0) as u32;
    let scaled_h = (size.height() * scale).ceil().max(1.0) as u32;

    let (width, height) = crate::codec::fit_within(scaled_w, scaled_h, max_dimension);
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        ProcessingError::Encode(format!("cannot allocate a {width}x{height} canvas"))
    })?;

    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    image::RgbaImage::from_raw(width, height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| ProcessingError::Encode("rendered buffer has the wrong size".to_string()))
}

#[cfg(not(feature = "svg-render"))]
pub fn render_in_process(
    _svg: &[u8],
    _scale: f32,
    _max_dimension: u32,
) -> Result<DynamicImage, ProcessingError> {
    Err(ProcessingError::UnsupportedFormat(
        "in-process SVG rendering is not compiled in".to_string(),
    ))
}

/// Render with the external rasterizer into a `max_dimension` box.
///
/// The tool is always asked for PNG on stdout; the caller re-encodes to the
/// requested format. It reads the SVG from a temporary copy that is removed
/// before returning.
pub fn render_with_tool(
    tool: &dyn ExternalTool,
    svg: &[u8],
    max_dimension: u32,
    temp_dir: &Path,
) -> Result<DynamicImage, ProcessingError> {
    std::fs::create_dir_all(temp_dir)?;
    let source = TempArtifact::create(temp_dir, ".svg")?;
    source.write_bytes(svg)?;

    let size = max_dimension.to_string();
    let args: Vec<OsString> = vec![
        "--width".into(),
        size.clone().into(),
        "--height".into(),
        size.into(),
        "--keep-aspect-ratio".into(),
        "--format".into(),
        "png".into(),
        source.path().as_os_str().to_owned(),
    ];

    let output = tool.run(&args).map_err(|e| redact_error(e, &source))?;

    if !output.success() {
        return Err(ProcessingError::ToolExecutionFailed {
            tool: tool.name().to_string(),
            reason: output.describe_status(),
            output: redact(&output.diagnostics(), &[&source]),
        });
    }
    if output.stdout.is_empty() {
        return Err(ProcessingError::ToolExecutionFailed {
            tool: tool.name().to_string(),
            reason: "returned empty output".to_string(),
            output: redact(&output.diagnostics(), &[&source]),
        });
    }

    let img = decode_any(&output.stdout).map_err(|e| ProcessingError::ToolExecutionFailed {
        tool: tool.name().to_string(),
        reason: "returned unreadable output".to_string(),
        output: e.to_string(),
    })?;

    if let Err(e) = source.release() {
        log::warn!("Failed to remove temporary SVG copy: {e}");
    }
    Ok(img)
}

fn redact_error(err: ProcessingError, artifact: &TempArtifact) -> ProcessingError {
    match err {
        ProcessingError::ToolExecutionFailed {
            tool,
            reason,
            output,
        } => ProcessingError::ToolExecutionFailed {
            tool,
            reason,
            output: redact(&output, &[artifact]),
        },
        other => other,
    }
}
