//! Maktaba Server
//!
//! Serves the local library over HTTP and syncs it with the remote on
//! request.
//!
//! # Configuration
//!
//! Settings come from the config file, overridden by environment variables:
//! - `MAKTABA_CONFIG`: Path to config file (default: ~/.config/maktaba/config.yaml)
//! - `MAKTABA_PORT`: Port to listen on (default: 3001)
//! - `MAKTABA_DATA_DIR`: Directory holding snapshots (default: ~/.local/share/maktaba)
//! - `MAKTABA_BASE_URL`: Remote patch API
//! - `MAKTABA_API_KEY`: Key for the remote patch API
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `GET /api/categories`, `/api/authors`, `/api/books`, `/api/books/{id}`
//! - `GET /api/books/{id}/content`: Pages and outline; downloads the book if needed
//! - `GET /api/search?q=`, `GET /api/stats`
//! - `POST /api/sync/master`, `POST /api/sync/book/{id}`

use maktaba::config::Config;
use maktaba::server::{router, AppState};
use maktaba_core::Library;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maktaba=info,maktaba_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("MAKTABA_CONFIG").ok().map(PathBuf::from);
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    // Ensure data directory exists
    if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Data directory: {}", config.data_dir().display());
    tracing::info!("Remote: {}", config.base_url.value);
    if config.require_api_key().is_err() {
        tracing::warn!("No API key configured - syncs will be rejected by the remote");
    }

    let library = Library::open(
        config.data_dir(),
        &config.base_url.value,
        config.api_key.value.as_deref().unwrap_or_default(),
    );
    let app = router(AppState::new(library)).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port.value));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
