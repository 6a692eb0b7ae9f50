//! Image format conversion core.
//!
//! [`engine::ConversionEngine`] takes a validated upload and picks a strategy:
//! raster re-encode through [`codec::RasterCodec`], SVG rendering or raster
//! tracing through [`bridge::VectorBridge`], or plain SVG passthrough.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod intake;
pub mod report;

pub use config::{Capabilities, ConversionMode, EngineConfig, Quality};
pub use engine::{ConversionEngine, ConversionRequest, ConversionResult};
pub use error::{ConversionFailure, ErrorKind, ProcessingError};
pub use format::{FormatRegistry, ImageFormat};
