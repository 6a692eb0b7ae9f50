//! The conversion decision engine.
//!
//! A request is routed on two axes, whether the source and the target are
//! vector formats:
//!
//! | source | target | strategy |
//! |---|---|---|
//! | vector | vector | passthrough, bytes unchanged |
//! | vector | raster | [`VectorBridge::rasterize_svg`] |
//! | raster | vector | [`VectorBridge::vectorize_raster`] |
//! | raster | raster | [`RasterCodec`] decode + encode |
//!
//! Every failure is translated into a [`ConversionFailure`] carrying one
//! user-facing message; no bytes are returned alongside an error.

use std::sync::Arc;
use std::time::Instant;

use crate::bridge::rasterize::Renderer;
use crate::bridge::tool::{ExternalTool, SystemTool};
use crate::bridge::VectorBridge;
use crate::codec::RasterCodec;
use crate::config::{Capabilities, ConversionMode, EngineConfig, Quality};
use crate::error::{ConversionFailure, ProcessingError};
use crate::format::{FormatRegistry, ImageFormat};
use crate::report::SizeReport;

/// One validated upload, consumed by a single engine call.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source_bytes: Vec<u8>,
    /// Content-sniffed MIME type; trusted as authoritative.
    pub source_mime: String,
    pub source_ext: String,
    pub target: ImageFormat,
    pub quality: Quality,
    pub mode: ConversionMode,
}

impl ConversionRequest {
    /// Convert to `target`. Quality defaults to 95 when not given.
    pub fn convert(
        source_bytes: Vec<u8>,
        source_mime: impl Into<String>,
        source_ext: impl Into<String>,
        target: ImageFormat,
        quality: Option<i64>,
    ) -> Self {
        Self {
            source_bytes,
            source_mime: source_mime.into(),
            source_ext: source_ext.into(),
            target,
            quality: ConversionMode::Convert.resolve_quality(quality),
            mode: ConversionMode::Convert,
        }
    }

    /// Re-encode in the source's own format. Quality defaults to 75.
    ///
    /// The target follows the file extension, falling back to the MIME type
    /// when the extension is not a known image extension.
    pub fn compress(
        source_bytes: Vec<u8>,
        source_mime: impl Into<String>,
        source_ext: impl Into<String>,
        quality: Option<i64>,
    ) -> Result<Self, ProcessingError> {
        let source_mime = source_mime.into();
        let source_ext = source_ext.into();
        let target = ImageFormat::from_extension(&source_ext)
            .or_else(|| ImageFormat::from_mime(&source_mime))
            .ok_or_else(|| ProcessingError::UnsupportedFormat(source_ext.clone()))?;

        Ok(Self {
            source_bytes,
            source_mime,
            source_ext,
            target,
            quality: ConversionMode::Compress.resolve_quality(quality),
            mode: ConversionMode::Compress,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub bytes: Vec<u8>,
    /// Always the concrete MIME type of `format`.
    pub mime: &'static str,
    pub format: ImageFormat,
    pub message: String,
    /// Positive size reduction in percent, raster re-encodes only.
    pub reduction: Option<f64>,
    pub original_size: usize,
}

pub struct ConversionEngine {
    config: EngineConfig,
    capabilities: Capabilities,
    codec: RasterCodec,
    bridge: VectorBridge,
}

impl ConversionEngine {
    pub fn new(
        config: EngineConfig,
        capabilities: Capabilities,
        svg_tool: Arc<dyn ExternalTool>,
        vectorizer: Arc<dyn ExternalTool>,
    ) -> Self {
        let codec = RasterCodec::new(&capabilities, &config);
        let bridge = VectorBridge::new(&config, capabilities, svg_tool, vectorizer);
        Self {
            config,
            capabilities,
            codec,
            bridge,
        }
    }

    /// Build with the real command-line tools, probing them once.
    pub fn with_system_tools(config: EngineConfig) -> Self {
        let svg_tool: Arc<dyn ExternalTool> =
            Arc::new(SystemTool::new(config.rsvg_command.clone(), config.tool_timeout));
        let vectorizer: Arc<dyn ExternalTool> =
            Arc::new(SystemTool::new(config.potrace_command.clone(), config.tool_timeout));
        let capabilities = Capabilities::detect(&config, svg_tool.as_ref(), vectorizer.as_ref());
        Self::new(config, capabilities, svg_tool, vectorizer)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, ConversionFailure> {
        let started = Instant::now();
        match self.dispatch(request) {
            Ok(result) => {
                log::info!(
                    "{} → {}: {} → {} bytes in {:?}",
                    request.source_mime,
                    result.mime,
                    request.source_bytes.len(),
                    result.bytes.len(),
                    started.elapsed()
                );
                Ok(result)
            }
            Err(err) => {
                log::error!(
                    "{} → {} failed [{}]: {}",
                    request.source_mime,
                    request.target.mime(),
                    err.kind().as_str(),
                    err
                );
                if let Some(detail) = err.detail() {
                    log::error!("Tool output: {detail}");
                }
                Err(ConversionFailure::from(err))
            }
        }
    }

    /// Shorthand for [`ConversionRequest::compress`] followed by [`Self::convert`].
    pub fn compress(
        &self,
        source_bytes: Vec<u8>,
        source_mime: &str,
        source_ext: &str,
        quality: Option<i64>,
    ) -> Result<ConversionResult, ConversionFailure> {
        let request = ConversionRequest::compress(source_bytes, source_mime, source_ext, quality)?;
        self.convert(&request)
    }

    fn dispatch(&self, request: &ConversionRequest) -> Result<ConversionResult, ProcessingError> {
        let registry = match request.mode {
            ConversionMode::Compress => FormatRegistry::compression(),
            ConversionMode::Convert => FormatRegistry::conversion(),
        };

        let source = ImageFormat::from_mime(&request.source_mime)
            .filter(|f| registry.inputs().contains(f))
            .ok_or_else(|| ProcessingError::UnsupportedFormat(request.source_mime.clone()))?;

        let target = request.target;
        if !registry.is_allowed_output(target) {
            return Err(ProcessingError::UnsupportedFormat(format!(
                "{} output",
                target.as_str()
            )));
        }

        if request.source_bytes.is_empty() {
            return Err(ProcessingError::Decode("input is empty".to_string()));
        }

        match (source.is_vector(), target.is_vector()) {
            (true, true) => Ok(self.passthrough(request, source)),
            (true, false) => self.rasterize(request, target),
            (false, true) => self.vectorize(request),
            (false, false) => self.transcode(request, target),
        }
    }

    fn passthrough(&self, request: &ConversionRequest, source: ImageFormat) -> ConversionResult {
        log::debug!("Vector → vector: returning input unchanged");
        ConversionResult {
            bytes: request.source_bytes.clone(),
            mime: source.mime(),
            format: source,
            message: "SVG uploaded successfully (no conversion).".to_string(),
            reduction: None,
            original_size: request.source_bytes.len(),
        }
    }

    fn rasterize(
        &self,
        request: &ConversionRequest,
        target: ImageFormat,
    ) -> Result<ConversionResult, ProcessingError> {
        log::debug!("Vector → raster ({})", target.as_str());
        let rasterized = self.bridge.rasterize_svg(
            &self.codec,
            &request.source_bytes,
            target,
            self.config.max_raster_dimension,
        )?;

        let via = match rasterized.renderer {
            Renderer::InProcess => "resvg",
            Renderer::ExternalTool => self.bridge.svg_tool_name(),
        };
        Ok(ConversionResult {
            message: format!(
                "SVG converted successfully to {} ({}x{}, via {}).",
                target.as_str(),
                rasterized.width,
                rasterized.height,
                via
            ),
            mime: rasterized.format.mime(),
            format: rasterized.format,
            bytes: rasterized.bytes,
            reduction: None,
            original_size: request.source_bytes.len(),
        })
    }

    fn vectorize(&self, request: &ConversionRequest) -> Result<ConversionResult, ProcessingError> {
        log::debug!("Raster → vector");
        let svg = self.bridge.vectorize_raster(&self.codec, &request.source_bytes)?;
        Ok(ConversionResult {
            bytes: svg,
            mime: ImageFormat::Svg.mime(),
            format: ImageFormat::Svg,
            message: "Image converted successfully to SVG (vectorized).".to_string(),
            reduction: None,
            original_size: request.source_bytes.len(),
        })
    }

    fn transcode(
        &self,
        request: &ConversionRequest,
        target: ImageFormat,
    ) -> Result<ConversionResult, ProcessingError> {
        log::debug!(
            "Raster → raster ({}, quality {})",
            target.as_str(),
            request.quality.value()
        );
        let img = self.codec.decode(&request.source_bytes)?;
        let bytes = self.codec.encode(&img, target, request.quality)?;
        drop(img);

        let sizes = SizeReport::new(request.source_bytes.len(), bytes.len());
        let message = match request.mode {
            ConversionMode::Compress => sizes.compress_message(request.quality.value()),
            ConversionMode::Convert => format!(
                "Image converted successfully to {}. {}",
                target.as_str(),
                sizes.convert_suffix()
            ),
        };

        Ok(ConversionResult {
            bytes,
            mime: target.mime(),
            format: target,
            message,
            reduction: sizes.reduction(),
            original_size: request.source_bytes.len(),
        })
    }
}
