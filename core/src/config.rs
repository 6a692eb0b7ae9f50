use std::path::PathBuf;
use std::time::Duration;

use crate::bridge::tool::ExternalTool;

/// Default quality when recompressing in the source format.
pub const COMPRESS_DEFAULT_QUALITY: u8 = 75;
/// Default quality when converting; conversion favours fidelity over size.
pub const CONVERT_DEFAULT_QUALITY: u8 = 95;
/// Quality used for rendered SVG output in lossy formats.
pub const SVG_RASTER_QUALITY: u8 = 95;
/// User units per inch in SVG.
pub const SVG_UNITS_PER_INCH: f32 = 96.0;

/// Lossy encoding quality, always within 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    /// Clamp any caller-provided integer into 1..=100.
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(CONVERT_DEFAULT_QUALITY)
    }
}

/// Which front end asked for the work. Only affects the default quality
/// and the wording of the outcome message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    Compress,
    Convert,
}

impl ConversionMode {
    pub fn default_quality(self) -> Quality {
        match self {
            ConversionMode::Compress => Quality(COMPRESS_DEFAULT_QUALITY),
            ConversionMode::Convert => Quality(CONVERT_DEFAULT_QUALITY),
        }
    }

    /// Explicit quality if the caller gave one, else the mode default. Clamped either way.
    pub fn resolve_quality(self, requested: Option<i64>) -> Quality {
        requested.map(Quality::new).unwrap_or_else(|| self.default_quality())
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for intermediate files of the vectorizer.
    pub temp_dir: PathBuf,
    /// Rendered SVGs are scaled down so neither side exceeds this.
    pub max_raster_dimension: u32,
    /// Density for in-process SVG rendering, before the size bound applies.
    pub svg_render_dpi: f32,
    /// Optional bounding box applied before vectorization.
    pub vectorize_max_dimension: Option<u32>,
    /// Upper bound for a single external tool run.
    pub tool_timeout: Duration,
    pub rsvg_command: String,
    pub potrace_command: String,
    /// oxipng preset 0-6 used by the full backend.
    pub png_optimization_level: u8,
    /// Use the minimal backend even when the full one is compiled in.
    pub force_minimal_backend: bool,
}

impl EngineConfig {
    /// Scale from SVG user units to output pixels.
    pub fn svg_render_scale(&self) -> f32 {
        if self.svg_render_dpi.is_finite() && self.svg_render_dpi > 0.0 {
            self.svg_render_dpi / SVG_UNITS_PER_INCH
        } else {
            1.0
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            max_raster_dimension: 1600,
            svg_render_dpi: 300.0,
            vectorize_max_dimension: None,
            tool_timeout: Duration::from_secs(30),
            rsvg_command: "rsvg-convert".to_string(),
            potrace_command: "potrace".to_string(),
            png_optimization_level: 2,
            force_minimal_backend: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `image` crate plus libwebp and oxipng.
    Full,
    /// `image` crate only.
    Minimal,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Full => "full",
            BackendKind::Minimal => "minimal",
        }
    }
}

/// What the process can do, discovered once at startup.
///
/// The snapshot is handed to [`crate::engine::ConversionEngine::new`] and never
/// re-probed while requests are running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub backend: BackendKind,
    /// In-process SVG rendering is compiled in.
    pub svg_render: bool,
    /// The external SVG rasterizer answered a version probe.
    pub svg_tool: bool,
    /// The external vectorizer answered a version probe.
    pub vectorizer: bool,
}

impl Capabilities {
    pub fn detect(
        config: &EngineConfig,
        svg_tool: &dyn ExternalTool,
        vectorizer: &dyn ExternalTool,
    ) -> Self {
        let backend = if cfg!(feature = "full-backend") && !config.force_minimal_backend {
            BackendKind::Full
        } else {
            BackendKind::Minimal
        };
        let caps = Self {
            backend,
            svg_render: cfg!(feature = "svg-render"),
            svg_tool: svg_tool.is_available(),
            vectorizer: vectorizer.is_available(),
        };
        log::info!(
            "Capabilities: backend={}, svg_render={}, {}={}, {}={}",
            caps.backend.as_str(),
            caps.svg_render,
            svg_tool.name(),
            caps.svg_tool,
            vectorizer.name(),
            caps.vectorizer
        );
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_is_clamped() {
        for raw in [0, -5, 101, 1000, i64::MIN, i64::MAX] {
            let q = Quality::new(raw).value();
            assert!((1..=100).contains(&q), "{raw} -> {q}");
        }
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(1000).value(), 100);
        assert_eq!(Quality::new(42).value(), 42);
    }

    #[test]
    fn mode_defaults_differ() {
        assert_eq!(ConversionMode::Compress.resolve_quality(None).value(), 75);
        assert_eq!(ConversionMode::Convert.resolve_quality(None).value(), 95);
        assert_eq!(ConversionMode::Convert.resolve_quality(Some(-5)).value(), 1);
    }

    #[test]
    fn default_config_bounds_rasters_at_1600() {
        let config = EngineConfig::default();
        assert_eq!(config.max_raster_dimension, 1600);
        assert_eq!(config.svg_render_scale(), 3.125);
        assert_eq!(config.potrace_command, "potrace");
    }
}
