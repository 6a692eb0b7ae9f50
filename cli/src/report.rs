use std::fmt::Write as _;
use std::path::PathBuf;

use image_converter_core::report::format_size;
use image_converter_core::{Capabilities, ConversionResult};

/// What one invocation produced.
pub struct Outcome {
    pub output: PathBuf,
    pub original_size: u64,
    pub output_size: u64,
    pub message: String,
    pub reduction: Option<f64>,
}

impl Outcome {
    pub fn new(output: PathBuf, result: &ConversionResult) -> Self {
        Self {
            output,
            original_size: result.original_size as u64,
            output_size: result.bytes.len() as u64,
            message: result.message.clone(),
            reduction: result.reduction,
        }
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.message);
        let _ = write!(
            out,
            "{} → {}",
            format_size(self.original_size),
            format_size(self.output_size)
        );
        if let Some(pct) = self.reduction {
            let _ = write!(out, " ({pct:.1}% reduction)");
        }
        let _ = write!(out, "\nSaved to {}", self.output.display());
        out
    }

    pub fn print_summary(&self) {
        println!("{}", self.summary());
    }
}

pub fn capabilities_summary(caps: &Capabilities, svg_tool: &str, vectorizer: &str) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    format!(
        "Backend: {}\nIn-process SVG rendering: {}\n{svg_tool}: {}\n{vectorizer}: {}",
        caps.backend.as_str(),
        yes_no(caps.svg_render),
        yes_no(caps.svg_tool),
        yes_no(caps.vectorizer),
    )
}
