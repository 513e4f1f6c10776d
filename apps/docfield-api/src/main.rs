//! docfield API Server
//!
//! HTTP boundary for field extraction over OCR. Provides REST endpoints for:
//!
//! - Field extraction via document Q&A, regex patterns or OCR line heuristics
//! - End-to-end parser (Donut) extraction placed on OCR evidence
//! - Column/template transfer from user-labeled examples
//! - Vendor template storage and cross-document application
//!
//! OCR, the Q&A model, the parser and PDF rasterization are remote services
//! reached over HTTP/JSON.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use docfield_core::ExtractionConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod handlers;
mod models;
mod remote;
mod state;

use state::{AppState, ServiceUrls};

/// Command-line arguments for the docfield API server
#[derive(Parser, Debug)]
#[command(name = "docfield-api")]
#[command(about = "Field extraction and template transfer over OCR")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Extraction thresholds (TOML); built-in defaults when absent
    #[arg(short, long, env = "DOCFIELD_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding one JSON template per vendor
    #[arg(long, env = "TEMPLATE_DIR", default_value = "templates")]
    template_dir: PathBuf,

    /// OCR service base URL
    #[arg(long, env = "OCR_SERVICE_URL", default_value = "http://localhost:8001")]
    ocr_url: String,

    /// Document Q&A model service base URL
    #[arg(long, env = "QA_SERVICE_URL", default_value = "http://localhost:8002")]
    qa_url: String,

    /// Donut parser service base URL
    #[arg(long, env = "DONUT_SERVICE_URL", default_value = "http://localhost:8003")]
    donut_url: String,

    /// PDF rasterizer service base URL
    #[arg(long, env = "RASTERIZER_URL", default_value = "http://localhost:8004")]
    rasterizer_url: String,

    /// Timeout for each backend call in seconds
    #[arg(long, env = "SERVICE_TIMEOUT_SECS", default_value = "120")]
    timeout_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Extraction
        .route("/api/extract", post(handlers::extract))
        .route("/api/extract/donut", post(handlers::extract_donut))
        .route("/api/transfer", post(handlers::transfer))
        // Vendor templates
        .route("/api/templates", get(handlers::list_templates))
        .route(
            "/api/templates/:vendor",
            get(handlers::get_template)
                .put(handlers::save_template)
                .delete(handlers::delete_template),
        )
        .route("/api/templates/:vendor/apply", post(handlers::apply_template))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(log_level.into())
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => {
            info!("Loading extraction config from {}", path.display());
            ExtractionConfig::from_file(path)?
        }
        None => ExtractionConfig::default(),
    };

    let urls = ServiceUrls {
        ocr: args.ocr_url.clone(),
        qa: args.qa_url.clone(),
        parser: args.donut_url.clone(),
        rasterizer: args.rasterizer_url.clone(),
    };
    let state = AppState::with_remote_services(
        config,
        &urls,
        Duration::from_secs(args.timeout_secs),
        &args.template_dir,
    )?;
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("docfield API listening on http://{}", addr);
    info!("OCR: {}, Q&A: {}, Donut: {}", urls.ocr, urls.qa, urls.parser);

    axum::serve(listener, app).await?;

    Ok(())
}
