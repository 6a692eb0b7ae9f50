#![allow(dead_code)]

use std::ffi::OsString;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, Rgba, RgbaImage};
use image_converter_core::bridge::tool::{ExternalTool, ToolOutput};
use image_converter_core::config::BackendKind;
use image_converter_core::{Capabilities, ConversionEngine, EngineConfig, ProcessingError};

type Handler = dyn Fn(&[OsString]) -> Result<ToolOutput, ProcessingError> + Send + Sync;

/// Scriptable stand-in for a command-line tool.
pub struct FakeTool {
    name: &'static str,
    available: bool,
    handler: Box<Handler>,
    calls: AtomicUsize,
}

impl FakeTool {
    pub fn new<F>(name: &'static str, handler: F) -> Arc<Self>
    where
        F: Fn(&[OsString]) -> Result<ToolOutput, ProcessingError> + Send + Sync + 'static,
    {
        Self::build(name, true, handler)
    }

    pub fn absent(name: &'static str) -> Arc<Self> {
        Self::build(name, false, move |_| panic!("{name} is not installed and must not run"))
    }

    fn build<F>(name: &'static str, available: bool, handler: F) -> Arc<Self>
    where
        F: Fn(&[OsString]) -> Result<ToolOutput, ProcessingError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name,
            available,
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExternalTool for FakeTool {
    fn name(&self) -> &str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn run(&self, args: &[OsString]) -> Result<ToolOutput, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.handler)(args)
    }
}

pub fn ok_output(stdout: Vec<u8>) -> ToolOutput {
    ToolOutput {
        stdout,
        stderr: Vec::new(),
        exit_code: Some(0),
    }
}

/// A potrace lookalike: reads the BMP, writes an SVG that records its size.
pub fn fake_potrace() -> Arc<FakeTool> {
    FakeTool::new("potrace", |args| {
        assert_eq!(args.len(), 4);
        assert_eq!(args[1], "-s");
        assert_eq!(args[2], "-o");
        let bitmap = image::open(Path::new(&args[0])).expect("potrace input must be a BMP");
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}"><path d="M0 0"/></svg>"#,
            bitmap.width(),
            bitmap.height()
        );
        std::fs::write(Path::new(&args[3]), svg).unwrap();
        Ok(ok_output(Vec::new()))
    })
}

/// An rsvg-convert lookalike returning a half-transparent PNG sized by `--width`.
pub fn fake_rsvg() -> Arc<FakeTool> {
    FakeTool::new("rsvg-convert", |args| {
        assert!(args.iter().any(|a| a == "png"));
        let source = Path::new(args.last().unwrap());
        assert!(source.exists(), "SVG copy must exist while the tool runs");
        let width: u32 = args[1].to_str().unwrap().parse().unwrap();
        Ok(ok_output(encode_png(&half_transparent(width, width / 2))))
    })
}

pub fn capabilities(svg_render: bool, svg_tool: bool, vectorizer: bool) -> Capabilities {
    Capabilities {
        backend: if cfg!(feature = "full-backend") {
            BackendKind::Full
        } else {
            BackendKind::Minimal
        },
        svg_render,
        svg_tool,
        vectorizer,
    }
}

pub fn engine_with(
    temp_dir: &Path,
    caps: Capabilities,
    svg_tool: Arc<FakeTool>,
    vectorizer: Arc<FakeTool>,
) -> ConversionEngine {
    let config = EngineConfig {
        temp_dir: temp_dir.to_path_buf(),
        ..EngineConfig::default()
    };
    ConversionEngine::new(config, caps, svg_tool, vectorizer)
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
}

pub fn half_transparent(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([200, 30, 30, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

pub fn noisy_rgb(width: u32, height: u32) -> DynamicImage {
    let mut seed: u32 = 0x9e37_79b9;
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let base = ((x * 3 + y * 2) % 256) as u8;
        let noise = (seed % 24) as u8;
        Rgba([base.wrapping_add(noise), base / 2 + noise, 255 - base, 255])
    }))
}

pub fn encode(img: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    encode(img, image::ImageFormat::Png)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Vec<u8> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}
