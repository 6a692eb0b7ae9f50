//! Format registry: which formats the converter accepts and produces.
//!
//! Two profiles exist. [`FormatRegistry::compression`] only deals with
//! raster formats (output format equals input format), while
//! [`FormatRegistry::conversion`] additionally accepts SVG and can emit it.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Avif,
    Svg,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Webp,
        ImageFormat::Avif,
        ImageFormat::Svg,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            "avif" => Some(ImageFormat::Avif),
            "svg" => Some(ImageFormat::Svg),
            _ => None,
        }
    }

    /// Parse a MIME string. Parameters such as `; charset=utf-8` are ignored.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/webp" => Some(ImageFormat::Webp),
            "image/avif" => Some(ImageFormat::Avif),
            "image/svg+xml" => Some(ImageFormat::Svg),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Avif => "image/avif",
            ImageFormat::Svg => "image/svg+xml",
        }
    }

    /// Canonical file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
            ImageFormat::Avif => "avif",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Webp => "WEBP",
            ImageFormat::Avif => "AVIF",
            ImageFormat::Svg => "SVG",
        }
    }

    /// Lossy formats take a quality parameter; the others ignore it.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Webp | ImageFormat::Avif)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, ImageFormat::Svg)
    }

    pub fn supports_alpha(&self) -> bool {
        !matches!(self, ImageFormat::Jpeg)
    }

    /// Matching `image` crate format, `None` for SVG.
    pub fn to_image_format(self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::Webp => Some(image::ImageFormat::WebP),
            ImageFormat::Avif => Some(image::ImageFormat::Avif),
            ImageFormat::Svg => None,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::WebP => Some(ImageFormat::Webp),
            image::ImageFormat::Avif => Some(ImageFormat::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unknown image format: {s}"))
    }
}

/// Detect the MIME type from the leading bytes of a file.
///
/// Raster formats are recognised by magic number. SVG has none, so a text
/// document whose first tag is `<svg` (optionally behind an XML prolog,
/// comments or a doctype) is reported as `image/svg+xml`.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(data) {
        return ImageFormat::from_image_format(format).map(|f| f.mime());
    }
    if looks_like_svg(data) {
        return Some(ImageFormat::Svg.mime());
    }
    None
}

fn looks_like_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(4096)];
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let text = String::from_utf8_lossy(head);
    let mut rest = text.trim_start();

    // Skip the prolog: XML declaration, processing instructions, comments, doctype
    loop {
        let skipped = if rest.starts_with("<?") {
            rest.find("?>").map(|end| &rest[end + 2..])
        } else if rest.starts_with("<!--") {
            rest.find("-->").map(|end| &rest[end + 3..])
        } else if rest.starts_with("<!") {
            skip_doctype(rest)
        } else {
            break;
        };
        match skipped {
            Some(after) => rest = after.trim_start(),
            None => return false,
        }
    }

    let Some(tag) = rest.strip_prefix("<svg") else {
        return false;
    };
    matches!(tag.chars().next(), Some(c) if c.is_whitespace() || c == '>' || c == '/')
}

/// Skip `<!DOCTYPE ...>`, including an internal `[...]` subset.
fn skip_doctype(text: &str) -> Option<&str> {
    let close = text.find('>')?;
    match text.find('[') {
        Some(open) if open < close => text[open..].find("]>").map(|end| &text[open + end + 2..]),
        _ => Some(&text[close + 1..]),
    }
}

/// Static allow-lists for one upload profile.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    inputs: &'static [ImageFormat],
    outputs: &'static [ImageFormat],
    max_upload_bytes: usize,
}

const RASTER_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Webp,
    ImageFormat::Avif,
];

/// Raster formats the codec can read. AVIF decoding needs libdav1d.
#[cfg(feature = "avif-decode")]
const RASTER_INPUTS: &[ImageFormat] = RASTER_FORMATS;
#[cfg(not(feature = "avif-decode"))]
const RASTER_INPUTS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Webp,
];

#[cfg(feature = "avif-decode")]
const CONVERSION_INPUTS: &[ImageFormat] = &ImageFormat::ALL;
#[cfg(not(feature = "avif-decode"))]
const CONVERSION_INPUTS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Webp,
    ImageFormat::Svg,
];

const CONVERSION_OUTPUTS: &[ImageFormat] = &[
    ImageFormat::Webp,
    ImageFormat::Avif,
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Svg,
];

impl FormatRegistry {
    /// Recompression: raster only, 10 MB uploads.
    pub fn compression() -> Self {
        Self {
            inputs: RASTER_INPUTS,
            outputs: RASTER_FORMATS,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }

    /// Format conversion: raster and SVG, 8 MB uploads.
    pub fn conversion() -> Self {
        Self {
            inputs: CONVERSION_INPUTS,
            outputs: CONVERSION_OUTPUTS,
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn inputs(&self) -> &[ImageFormat] {
        self.inputs
    }

    pub fn outputs(&self) -> &[ImageFormat] {
        self.outputs
    }

    /// Both the extension and the MIME type must name an accepted input format.
    /// They are checked independently, so `photo.jpg` declared as `image/png`
    /// still passes here; content sniffing happens in [`crate::intake`].
    pub fn is_allowed_input(&self, ext: &str, mime: &str) -> bool {
        let by_ext = ImageFormat::from_extension(ext).is_some_and(|f| self.inputs.contains(&f));
        let by_mime = ImageFormat::from_mime(mime).is_some_and(|f| self.inputs.contains(&f));
        by_ext && by_mime
    }

    pub fn is_allowed_output(&self, format: ImageFormat) -> bool {
        self.outputs.contains(&format)
    }

    pub fn mime_for(&self, format: ImageFormat) -> &'static str {
        format.mime()
    }

    pub fn is_lossy(&self, format: ImageFormat) -> bool {
        format.is_lossy()
    }

    /// Comma separated extension list for error messages.
    pub fn describe_inputs(&self) -> String {
        let mut exts: Vec<&str> = Vec::new();
        for format in self.inputs {
            if *format == ImageFormat::Jpeg {
                exts.push("jpg");
            }
            exts.push(format.extension());
        }
        exts.join(", ")
    }
}
