use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use image_converter_core::{ConversionEngine, EngineConfig};

mod handlers;
mod sink;

use handlers::AppState;
use sink::{DeliveryMode, OutputSink, MAX_STORED_AGE, SWEEP_INTERVAL};

/// Uploads a little over the largest registry limit still reach validation.
const BODY_LIMIT: usize = 12 * 1024 * 1024;

/// HTTP front end for the image converter
#[derive(Debug, Parser)]
#[command(name = "server", version, about)]
struct Args {
    /// Listen address
    #[arg(long, env = "IMAGE_CONVERTER_ADDR", default_value = "0.0.0.0:3000")]
    addr: String,

    /// Directory for stored outputs and tool intermediates
    #[arg(long, env = "IMAGE_CONVERTER_UPLOADS", default_value = "uploads")]
    uploads: PathBuf,

    /// How finished conversions are returned
    #[arg(long, env = "IMAGE_CONVERTER_DELIVERY", value_enum, default_value_t = DeliveryMode::Download)]
    delivery: DeliveryMode,

    /// Seconds before an external tool run is killed
    #[arg(long, env = "IMAGE_CONVERTER_TOOL_TIMEOUT", default_value_t = 30)]
    tool_timeout: u64,

    /// SVG rasterizer command
    #[arg(long, env = "IMAGE_CONVERTER_RSVG", default_value = "rsvg-convert")]
    rsvg: String,

    /// Vectorizer command
    #[arg(long, env = "IMAGE_CONVERTER_POTRACE", default_value = "potrace")]
    potrace: String,

    /// Use only the built-in image encoders
    #[arg(long, env = "IMAGE_CONVERTER_MINIMAL_BACKEND")]
    minimal_backend: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            temp_dir: self.uploads.join("tmp"),
            tool_timeout: Duration::from_secs(self.tool_timeout),
            rsvg_command: self.rsvg.clone(),
            potrace_command: self.potrace.clone(),
            force_minimal_backend: self.minimal_backend,
            ..EngineConfig::default()
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health))
        .route("/capabilities", get(handlers::capabilities))
        .route("/compress", post(handlers::compress))
        .route("/convert", post(handlers::convert))
        .route("/download/:file", get(handlers::download))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.engine_config();
    std::fs::create_dir_all(&config.temp_dir)
        .with_context(|| format!("Failed to create {}", config.temp_dir.display()))?;

    let engine = tokio::task::spawn_blocking(move || ConversionEngine::with_system_tools(config))
        .await
        .context("Capability probe panicked")?;

    let state = AppState {
        engine: Arc::new(engine),
        sink: Arc::new(OutputSink::new(args.delivery, &args.uploads)),
    };
    spawn_sweeper(state.sink.clone());

    let app = app(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    log::info!("Image converter server running on http://{}", args.addr);
    log::info!("API endpoints:");
    log::info!("   POST /compress - Re-encode an image in its own format");
    log::info!("   POST /convert - Convert between formats, SVG included");
    log::info!("   GET  /download/:file - One-shot download of a stored result");
    log::info!("   GET  /capabilities - Backend and external tools");
    log::info!("   GET  /health - Health check");

    let listener = tokio::net::TcpListener::bind(&args.addr)
        .await
        .with_context(|| format!("Failed to bind {}", args.addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Delete stored outputs nobody came back for.
fn spawn_sweeper(sink: Arc<OutputSink>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let sink = sink.clone();
            match tokio::task::spawn_blocking(move || sink.sweep(MAX_STORED_AGE)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(n)) => log::info!("Sweep removed {n} expired file(s)"),
                Ok(Err(e)) => log::warn!("Sweep failed: {e}"),
                Err(e) => log::warn!("Sweep task failed: {e}"),
            }
        }
    });
}

async fn root() -> &'static str {
    "Image Converter Server\n\nAPI Endpoints:\n  POST /compress\n  POST /convert\n  GET  /download/:file\n  GET  /capabilities\n  GET  /health\n"
}
