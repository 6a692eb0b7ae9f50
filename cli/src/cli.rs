use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use image_converter_core::EngineConfig;

/// Convert and compress images between JPEG, PNG, GIF, WebP, AVIF and SVG
#[derive(Debug, Parser)]
#[command(name = "image_converter", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for intermediate files of external tools
    #[arg(long, global = true, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Seconds before an external tool run is killed
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// SVG rasterizer command
    #[arg(long, global = true, default_value = "rsvg-convert")]
    pub rsvg: String,

    /// Vectorizer command
    #[arg(long, global = true, default_value = "potrace")]
    pub potrace: String,

    /// Longest side of a rendered SVG, in pixels
    #[arg(long, global = true, default_value_t = 1600, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_dimension: u32,

    /// Density for rendering SVGs in-process, before the size bound applies
    #[arg(long, global = true, default_value_t = 300.0, value_name = "DPI")]
    pub svg_dpi: f32,

    /// Use only the built-in image encoders
    #[arg(long, global = true)]
    pub minimal_backend: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert an image to another format
    Convert {
        /// Input image
        input: PathBuf,

        /// Output file or directory (default: next to the input)
        output: Option<PathBuf>,

        /// Target format (jpg, jpeg, png, gif, webp, avif, svg)
        #[arg(long, short = 't', value_name = "FORMAT")]
        to: String,

        /// Quality for lossy formats; clamped to 1-100, default 95
        #[arg(short, long, allow_negative_numbers = true)]
        quality: Option<i64>,
    },

    /// Re-encode an image in its own format
    Compress {
        /// Input image
        input: PathBuf,

        /// Output file or directory (default: <name>_compressed.<ext> next to the input)
        output: Option<PathBuf>,

        /// Quality for lossy formats; clamped to 1-100, default 75
        #[arg(short, long, allow_negative_numbers = true)]
        quality: Option<i64>,
    },

    /// Show which backend and external tools are usable
    Capabilities,
}

impl Cli {
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            temp_dir: self.temp_dir.clone().unwrap_or(defaults.temp_dir),
            max_raster_dimension: self.max_dimension,
            svg_render_dpi: self.svg_dpi,
            tool_timeout: Duration::from_secs(self.timeout),
            rsvg_command: self.rsvg.clone(),
            potrace_command: self.potrace.clone(),
            force_minimal_backend: self.minimal_backend,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_arguments_parse() {
        let cli = Cli::parse_from(["image_converter", "convert", "a.png", "-t", "webp", "-q", "-5"]);
        match cli.command {
            Command::Convert { input, output, to, quality } => {
                assert_eq!(input, PathBuf::from("a.png"));
                assert!(output.is_none());
                assert_eq!(to, "webp");
                assert_eq!(quality, Some(-5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_flow_into_engine_config() {
        let cli = Cli::parse_from([
            "image_converter",
            "compress",
            "a.jpg",
            "--timeout",
            "5",
            "--potrace",
            "/opt/potrace",
            "--minimal-backend",
        ]);
        let config = cli.engine_config();
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
        assert_eq!(config.potrace_command, "/opt/potrace");
        assert!(config.force_minimal_backend);
        assert_eq!(config.max_raster_dimension, 1600);
        assert_eq!(config.svg_render_dpi, 300.0);
    }

    #[test]
    fn svg_dpi_is_configurable() {
        let cli = Cli::parse_from(["image_converter", "convert", "a.svg", "-t", "png", "--svg-dpi", "96"]);
        assert_eq!(cli.engine_config().svg_render_scale(), 1.0);
    }

    #[test]
    fn compress_quality_is_optional() {
        let cli = Cli::parse_from(["image_converter", "compress", "a.jpg"]);
        assert!(matches!(cli.command, Command::Compress { quality: None, .. }));
    }
}
