use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vetdesk::config::Config;
use vetdesk::AppState;

#[derive(Parser, Debug)]
#[command(name = "vetdesk")]
#[command(author, version, about = "Administrative console server for a veterinary clinic", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "vetdesk.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vetdesk v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = vetdesk::db::init(&config.server.data_dir).await?;

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), db));

    // Create the configured bootstrap admin on first start
    vetdesk::api::auth::bootstrap_admin(&state).await?;

    // Create API router
    let api_router = vetdesk::api::create_router(state);

    // Serve the SPA bundle with index.html fallback so client-side routes
    // (/dashboard, /owners, ...) resolve on hard refresh
    let static_dir = config.server.static_dir.clone();
    let index_file = static_dir.join("index.html");
    let serve_static = ServeDir::new(&static_dir).not_found_service(ServeFile::new(&index_file));

    // Combine routers - API first, then static files as fallback
    let app = axum::Router::new()
        .merge(api_router)
        .fallback_service(serve_static);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Admin token: {}", config.auth.admin_token);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
