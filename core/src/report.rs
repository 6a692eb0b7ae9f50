//! Size bookkeeping for outcome messages.

/// `round((1 - output/original) * 100, 1)`; zero for an empty original.
pub fn reduction_percent(original_size: usize, output_size: usize) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let pct = (1.0 - output_size as f64 / original_size as f64) * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Kilobytes rounded to one decimal, e.g. `12.3`.
pub fn format_kb(bytes: usize) -> String {
    format!("{:.1}", bytes as f64 / 1024.0)
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Before/after sizes of a raster re-encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeReport {
    pub original_size: usize,
    pub output_size: usize,
}

impl SizeReport {
    pub fn new(original_size: usize, output_size: usize) -> Self {
        Self {
            original_size,
            output_size,
        }
    }

    /// Positive reduction only; `None` when the output did not shrink.
    pub fn reduction(&self) -> Option<f64> {
        let pct = reduction_percent(self.original_size, self.output_size);
        (pct > 0.0).then_some(pct)
    }

    pub fn compress_message(&self, quality: u8) -> String {
        match self.reduction() {
            Some(pct) => format!(
                "Image compressed successfully! Original: {}KB → Compressed: {}KB (Reduced by {}% at Quality: {}%)",
                format_kb(self.original_size),
                format_kb(self.output_size),
                pct,
                quality
            ),
            None => format!(
                "Image processed. Size: {}KB (Quality: {}%)",
                format_kb(self.output_size),
                quality
            ),
        }
    }

    pub fn convert_suffix(&self) -> String {
        match self.reduction() {
            Some(pct) => format!(
                "Original: {}KB → Converted: {}KB (Reduced by {}%)",
                format_kb(self.original_size),
                format_kb(self.output_size),
                pct
            ),
            None => format!("Size: {}KB", format_kb(self.output_size)),
        }
    }
}
