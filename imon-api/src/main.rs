//! imon-api - Photo donation and consensus validation service
//!
//! Donors upload labelled photos, reviewers vote on whether the label fits,
//! and photos that reach consensus become exportable by tag.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use imon_api::config::{CliArgs, Config, StoreBackend};
use imon_api::media::MediaStore;
use imon_api::store::{DonationStore, MemoryStore, SqliteStore};
use imon_api::{build_router, AppState};
use imon_common::{ThreadRandom, Wordlist};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = Config::resolve(&args).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any slow startup work
    info!(
        "Starting imon-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config.source {
        Some(path) => info!("Configuration file: {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    config
        .root
        .ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", config.root.path().display());

    let wordlist = Wordlist::load(&config.wordlist_path).with_context(|| {
        format!("Failed to load wordlist {}", config.wordlist_path.display())
    })?;
    info!("Wordlist ready: {} labels", wordlist.len());

    let store: Arc<dyn DonationStore> = match config.store {
        StoreBackend::Sqlite => {
            let db_path = config.root.database_path();
            info!("Database: {}", db_path.display());
            Arc::new(
                SqliteStore::connect(&db_path)
                    .await
                    .context("Failed to open donation database")?,
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; donations are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    let media = Arc::new(MediaStore::new(
        config.root.staging_dir(),
        config.root.donations_dir(),
    ));

    let state = AppState::new(
        store,
        media,
        Arc::new(wordlist),
        Arc::new(ThreadRandom),
        config.pipeline.clone(),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
