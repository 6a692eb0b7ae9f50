//! Bridges for the two directions the raster codec cannot handle:
//! SVG → raster and raster → SVG.

pub mod rasterize;
pub mod temp;
pub mod tool;
pub mod vectorize;

use std::path::PathBuf;
use std::sync::Arc;

use crate::codec::{downscale_to_fit, RasterCodec};
use crate::config::{Capabilities, EngineConfig, Quality, SVG_RASTER_QUALITY};
use crate::error::ProcessingError;
use crate::format::ImageFormat;
use rasterize::Renderer;
use tool::ExternalTool;

/// Encoded output of an SVG render.
#[derive(Debug)]
pub struct Rasterized {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub renderer: Renderer,
}

pub struct VectorBridge {
    svg_tool: Arc<dyn ExternalTool>,
    vectorizer: Arc<dyn ExternalTool>,
    capabilities: Capabilities,
    temp_dir: PathBuf,
    vectorize_max_dimension: Option<u32>,
    render_scale: f32,
}

impl VectorBridge {
    pub fn new(
        config: &EngineConfig,
        capabilities: Capabilities,
        svg_tool: Arc<dyn ExternalTool>,
        vectorizer: Arc<dyn ExternalTool>,
    ) -> Self {
        Self {
            svg_tool,
            vectorizer,
            capabilities,
            temp_dir: config.temp_dir.clone(),
            vectorize_max_dimension: config.vectorize_max_dimension,
            render_scale: config.svg_render_scale(),
        }
    }

    pub fn svg_tool_name(&self) -> &str {
        self.svg_tool.name()
    }

    /// Render an SVG document into `target`, bounded by `max_dimension`.
    ///
    /// In-process rendering is tried first when compiled in. Any failure in
    /// that attempt falls back to the external rasterizer exactly once, if
    /// it is installed; otherwise the first error is returned.
    pub fn rasterize_svg(
        &self,
        codec: &RasterCodec,
        svg: &[u8],
        target: ImageFormat,
        max_dimension: u32,
    ) -> Result<Rasterized, ProcessingError> {
        if target.is_vector() {
            return Err(ProcessingError::UnsupportedFormat(
                "rasterization needs a raster target".to_string(),
            ));
        }

        if self.capabilities.svg_render {
            let attempt = rasterize::render_in_process(svg, self.render_scale, max_dimension)
                .and_then(|img| finish(codec, img, target, max_dimension, Renderer::InProcess));
            match attempt {
                Ok(rasterized) => return Ok(rasterized),
                Err(e) if self.capabilities.svg_tool => {
                    log::warn!(
                        "In-process SVG rendering failed ({e}), falling back to {}",
                        self.svg_tool.name()
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if !self.capabilities.svg_tool {
            return Err(ProcessingError::ToolMissing {
                tool: self.svg_tool.name().to_string(),
            });
        }

        let img = rasterize::render_with_tool(
            self.svg_tool.as_ref(),
            svg,
            max_dimension,
            &self.temp_dir,
        )?;
        finish(codec, img, target, max_dimension, Renderer::ExternalTool)
    }

    /// Trace a raster image into an SVG document.
    pub fn vectorize_raster(
        &self,
        codec: &RasterCodec,
        raster: &[u8],
    ) -> Result<Vec<u8>, ProcessingError> {
        if !self.capabilities.vectorizer {
            return Err(ProcessingError::ToolMissing {
                tool: self.vectorizer.name().to_string(),
            });
        }

        let mut img = codec.decode(raster)?;
        if let Some(max) = self.vectorize_max_dimension {
            img = downscale_to_fit(img, max);
        }

        vectorize::trace_with_tool(self.vectorizer.as_ref(), &img, &self.temp_dir)
    }
}

fn finish(
    codec: &RasterCodec,
    img: image::DynamicImage,
    target: ImageFormat,
    max_dimension: u32,
    renderer: Renderer,
) -> Result<Rasterized, ProcessingError> {
    let img = downscale_to_fit(img, max_dimension);
    let bytes = codec.encode(&img, target, Quality::new(SVG_RASTER_QUALITY as i64))?;
    Ok(Rasterized {
        bytes,
        format: target,
        width: img.width(),
        height: img.height(),
        renderer,
    })
}
