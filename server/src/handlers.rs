use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use image_converter_core::intake::{
    parse_output_format, sanitize_base_name, validate_upload, UploadError, ValidatedUpload,
};
use image_converter_core::{
    ConversionEngine, ConversionFailure, ConversionMode, ConversionResult, ErrorKind,
    FormatRegistry, ImageFormat,
};

use crate::sink::{Delivery, OutputSink};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversionEngine>,
    pub sink: Arc<OutputSink>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversionPayload {
    message: String,
    format: &'static str,
    mime: &'static str,
    size: usize,
    original_size: usize,
    reduction: Option<f64>,
    output: Delivery,
}

#[derive(Debug, Serialize)]
pub struct ToolStatus {
    name: String,
    available: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesReport {
    backend: &'static str,
    svg_render: bool,
    svg_tool: ToolStatus,
    vectorizer: ToolStatus,
    compression_inputs: Vec<&'static str>,
    conversion_inputs: Vec<&'static str>,
    conversion_outputs: Vec<&'static str>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("{}", .0.message)]
    Conversion(#[from] ConversionFailure),

    #[error("Invalid form data.")]
    Form,

    #[error("File not found or already downloaded.")]
    NotFound,

    #[error("Internal server error.")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Upload(_) | ApiError::Form => StatusCode::BAD_REQUEST,
            ApiError::Conversion(f) if f.kind == ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Conversion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = match &self {
            ApiError::Conversion(f) => Some(f.kind.as_str()),
            _ => None,
        };
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
            kind,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Fields of an upload form.
#[derive(Default)]
struct UploadForm {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
    format: Option<String>,
    quality: Option<i64>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        loop {
            let field = match multipart.next_field().await {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(_) => return Err(ApiError::Form),
            };

            let name = field.name().unwrap_or("").to_string();

            match name.as_str() {
                "image" => {
                    form.file_name = field.file_name().unwrap_or("").to_string();
                    form.content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(|_| ApiError::Form)?;
                    form.bytes = bytes.to_vec();
                }
                "format" => {
                    let text = field.text().await.map_err(|_| ApiError::Form)?;
                    form.format = Some(text);
                }
                "quality" => {
                    if let Ok(text) = field.text().await {
                        form.quality = parse_quality(&text);
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn validate(self, registry: &FormatRegistry) -> Result<ValidatedUpload, UploadError> {
        validate_upload(registry, &self.file_name, self.content_type.as_deref(), self.bytes)
    }
}

/// Unparseable quality falls back to the mode default; range is clamped later.
fn parse_quality(text: &str) -> Option<i64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then(|| value.round() as i64)
}

/// POST /compress
///
/// Re-encode an uploaded raster image in its own format.
///
/// Form fields:
/// - image: binary file data
/// - quality (optional): 1-100 (default: 75)
pub async fn compress(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ConversionPayload>>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let quality = form.quality;
    let upload = form.validate(&FormatRegistry::compression())?;
    let save_as = upload.download_name(ConversionMode::Compress, upload.format);

    let payload = run(state, save_as, move |engine| {
        let request = upload
            .into_compress_request(quality)
            .map_err(ConversionFailure::from)?;
        engine.convert(&request)
    })
    .await?;
    Ok(Json(ApiResponse::ok(payload)))
}

/// POST /convert
///
/// Convert an uploaded image, including SVG in either direction.
///
/// Form fields:
/// - image: binary file data
/// - format: target format (webp, avif, jpeg, png, gif, svg)
/// - quality (optional): 1-100 (default: 95)
pub async fn convert(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ConversionPayload>>, ApiError> {
    let form = UploadForm::read(multipart).await?;
    let registry = FormatRegistry::conversion();
    let target = parse_output_format(&registry, form.format.as_deref().unwrap_or(""))?;
    let quality = form.quality;
    let upload = form.validate(&registry)?;
    let save_as = upload.download_name(ConversionMode::Convert, target);

    let payload = run(state, save_as, move |engine| {
        engine.convert(&upload.into_convert_request(target, quality))
    })
    .await?;
    Ok(Json(ApiResponse::ok(payload)))
}

/// Run the engine and the sink off the async runtime.
async fn run<F>(state: AppState, save_as: String, job: F) -> Result<ConversionPayload, ApiError>
where
    F: FnOnce(&ConversionEngine) -> Result<ConversionResult, ConversionFailure> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<ConversionPayload, ApiError> {
        let result = job(state.engine.as_ref())?;
        let output = state
            .sink
            .deliver(&result.bytes, result.format, &save_as)
            .map_err(|e| {
                log::error!("Failed to deliver {save_as}: {e}");
                ApiError::Internal
            })?;
        Ok(ConversionPayload {
            message: result.message,
            format: result.format.as_str(),
            mime: result.mime,
            size: result.bytes.len(),
            original_size: result.original_size,
            reduction: result.reduction,
            output,
        })
    })
    .await
    .map_err(|e| {
        log::error!("Conversion task failed: {e}");
        ApiError::Internal
    })?
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    name: Option<String>,
}

/// GET /download/:file
///
/// Serve a stored output once, then delete it.
pub async fn download(
    State(state): State<AppState>,
    Path(file): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let sink = state.sink.clone();
    let name = file.clone();
    let taken = tokio::task::spawn_blocking(move || sink.take(&name))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            log::error!("Failed to read stored output {file}: {e}");
            ApiError::Internal
        })?;

    let Some((bytes, format)) = taken else {
        return Err(ApiError::NotFound);
    };

    let save_as = attachment_name(query.name.as_deref(), format).unwrap_or(file);
    Ok((
        [
            (header::CONTENT_TYPE, format.mime().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{save_as}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn attachment_name(requested: Option<&str>, format: ImageFormat) -> Option<String> {
    let requested = requested?.trim();
    if requested.is_empty() {
        return None;
    }
    let (stem, ext) = match requested.rsplit_once('.') {
        Some((stem, ext)) if ImageFormat::from_extension(ext) == Some(format) => {
            (stem, ext.to_ascii_lowercase())
        }
        _ => (requested, format.extension().to_string()),
    };
    Some(format!("{}.{}", sanitize_base_name(stem), ext))
}

/// GET /capabilities
pub async fn capabilities(State(state): State<AppState>) -> Json<ApiResponse<CapabilitiesReport>> {
    let caps = state.engine.capabilities();
    let config = state.engine.config();
    let names = |formats: &[ImageFormat]| -> Vec<&'static str> {
        formats.iter().map(|f| f.extension()).collect()
    };

    let compression = FormatRegistry::compression();
    let conversion = FormatRegistry::conversion();
    Json(ApiResponse::ok(CapabilitiesReport {
        backend: caps.backend.as_str(),
        svg_render: caps.svg_render,
        svg_tool: ToolStatus {
            name: config.rsvg_command.clone(),
            available: caps.svg_tool,
        },
        vectorizer: ToolStatus {
            name: config.potrace_command.clone(),
            available: caps.vectorizer,
        },
        compression_inputs: names(compression.inputs()),
        conversion_inputs: names(conversion.inputs()),
        conversion_outputs: names(conversion.outputs()),
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::io::Cursor;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use image_converter_core::bridge::tool::{ExternalTool, ToolOutput};
    use image_converter_core::config::BackendKind;
    use image_converter_core::{Capabilities, EngineConfig, ProcessingError};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::sink::DeliveryMode;

    const BOUNDARY: &str = "XBOUNDARYX";

    struct Missing(&'static str);

    impl ExternalTool for Missing {
        fn name(&self) -> &str {
            self.0
        }
        fn is_available(&self) -> bool {
            false
        }
        fn run(&self, _args: &[OsString]) -> Result<ToolOutput, ProcessingError> {
            Err(ProcessingError::ToolMissing {
                tool: self.0.to_string(),
            })
        }
    }

    fn state(mode: DeliveryMode, dir: &std::path::Path) -> AppState {
        let caps = Capabilities {
            backend: BackendKind::Minimal,
            svg_render: false,
            svg_tool: false,
            vectorizer: false,
        };
        let config = EngineConfig {
            temp_dir: dir.join("tmp"),
            ..EngineConfig::default()
        };
        let engine = ConversionEngine::new(
            config,
            caps,
            Arc::new(Missing("rsvg-convert")),
            Arc::new(Missing("potrace")),
        );
        AppState {
            engine: Arc::new(engine),
            sink: Arc::new(OutputSink::new(mode, dir)),
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
        });
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    /// `(name, Some((file_name, content_type)), body)`
    fn form(fields: &[(&str, Option<(&str, &str)>, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, file, data) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file {
                Some((file_name, content_type)) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn post(uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn convert_returns_inline_data_uri() {
        let dir = tempfile::tempdir().unwrap();
        let image = png(40, 30);
        let body = form(&[
            ("image", Some(("photo.png", "image/png")), &image),
            ("format", None, b"jpeg"),
            ("quality", None, b"80"),
        ]);
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(post("/convert", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = json(response).await;
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["format"], "JPEG");
        assert_eq!(value["data"]["mime"], "image/jpeg");
        assert_eq!(value["data"]["output"]["type"], "inline");
        assert!(value["data"]["output"]["data_uri"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[tokio::test]
    async fn missing_image_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let body = form(&[("format", None, b"png")]);
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(post("/convert", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = json(response).await;
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Please upload an image.");
    }

    #[tokio::test]
    async fn unknown_output_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let image = png(4, 4);
        let body = form(&[
            ("image", Some(("a.png", "image/png")), &image),
            ("format", None, b"bmp"),
        ]);
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(post("/convert", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["error"], "Unsupported output format.");
    }

    #[tokio::test]
    async fn compression_does_not_accept_svg() {
        let dir = tempfile::tempdir().unwrap();
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"/>"#;
        let body = form(&[("image", Some(("logo.svg", "image/svg+xml")), svg)]);
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(post("/compress", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Allowed extensions:"), "{error}");
    }

    #[tokio::test]
    async fn missing_vectorizer_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let image = png(8, 8);
        let body = form(&[
            ("image", Some(("a.png", "image/png")), &image),
            ("format", None, b"svg"),
        ]);
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(post("/convert", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let value = json(response).await;
        assert_eq!(value["kind"], "tool_missing");
        assert_eq!(
            value["error"],
            "Processing failed: potrace is not installed on the server"
        );
    }

    #[tokio::test]
    async fn stored_output_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let app = crate::app(state(DeliveryMode::Download, dir.path()));
        let image = png(32, 32);
        let body = form(&[
            ("image", Some(("My Photo!.png", "image/png")), &image),
            ("quality", None, b"60"),
        ]);

        let response = app.clone().oneshot(post("/compress", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = json(response).await;
        assert_eq!(value["data"]["output"]["type"], "download");
        assert_eq!(value["data"]["output"]["file_name"], "My_Photo__compressed.png");
        assert!(value["data"]["message"].as_str().unwrap().contains("Quality: 60%"));
        let url = value["data"]["output"]["url"].as_str().unwrap().to_string();

        let first = app
            .clone()
            .oneshot(get(&format!("{url}?name=My_Photo_compressed.png")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            first.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"My_Photo_compressed.png\""
        );
        let bytes = to_bytes(first.into_body(), usize::MAX).await.unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());

        let second = app.oneshot(get(&url)).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn capabilities_lists_tools_and_formats() {
        let dir = tempfile::tempdir().unwrap();
        let response = crate::app(state(DeliveryMode::Inline, dir.path()))
            .oneshot(get("/capabilities"))
            .await
            .unwrap();
        let value = json(response).await;
        assert_eq!(value["data"]["backend"], "minimal");
        assert_eq!(value["data"]["vectorizer"]["name"], "potrace");
        assert_eq!(value["data"]["vectorizer"]["available"], false);
        let outputs = value["data"]["conversion_outputs"].as_array().unwrap();
        assert!(outputs.iter().any(|f| f == "svg"));
    }

    #[test]
    fn quality_text_is_lenient() {
        assert_eq!(parse_quality(" 80 "), Some(80));
        assert_eq!(parse_quality("72.6"), Some(73));
        assert_eq!(parse_quality("-4"), Some(-4));
        assert_eq!(parse_quality("high"), None);
        assert_eq!(parse_quality("NaN"), None);
    }

    #[test]
    fn attachment_names_are_sanitized() {
        assert_eq!(
            attachment_name(Some("../../etc/passwd"), ImageFormat::Png).as_deref(),
            Some("_etc_passwd.png")
        );
        assert_eq!(
            attachment_name(Some("cat.JPG"), ImageFormat::Jpeg).as_deref(),
            Some("cat.jpg")
        );
        assert_eq!(attachment_name(Some("  "), ImageFormat::Gif), None);
    }
}
