use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tempshare::blob_store::LocalStore;
use tempshare::config::Config;
use tempshare::lifecycle::Lifecycle;
use tempshare::storage::Database;
use tempshare::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "tempshare starting");

    // Configuration is a snapshot; nothing reloads it
    let config = Config::load()?;

    let db = Database::open(&config.node.data_dir)?;
    info!("Database opened at: {}", config.node.data_dir);

    let blobs = LocalStore::new(&config.storage.local_storage_path)?;
    info!("Storing blobs at: {}", config.storage.local_storage_path);

    let lifecycle = Lifecycle::new(db, Arc::new(blobs), &config.uploads);

    // Timers live only in memory; rebuild them before serving anything
    let stats = lifecycle.recover().await?;
    info!(
        reclaimed = stats.reclaimed,
        expired = stats.expired,
        armed = stats.armed,
        orphaned_blobs = stats.orphaned_blobs,
        missing_blobs = stats.missing_blobs,
        "Recovered object lifecycle"
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        lifecycle,
    });

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        armed = state.lifecycle.scheduler().armed(),
        pending = state.lifecycle.assembler().pending_count(),
        "Shutdown complete; timers will be re-armed on next start"
    );
    Ok(())
}

/// `LOG_FORMAT=gcp` emits Stackdriver JSON, `json` plain JSON lines, anything
/// else human-readable text. `RUST_LOG` filters, defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var("LOG_FORMAT")
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "gcp" => registry.with(tracing_stackdriver::layer()).init(),
        "json" => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(false),
            )
            .init(),
        _ => registry.with(fmt::layer()).init(),
    }
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
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
