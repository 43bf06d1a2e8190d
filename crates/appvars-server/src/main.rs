//! `AppVars` server entry point.
//!
//! Bootstraps the storage backend and the secret codec, then starts the Axum
//! HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use appvars_core::AesGcmCodec;
use appvars_core::crypto::EncryptionKey;
use appvars_storage::{MemoryBackend, StorageBackend};

use appvars_server::config::{ServerConfig, StorageBackendType};
use appvars_server::routes;
use appvars_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "AppVars starting");

    let state = build_app_state(&config).await?;
    let app = routes::app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "AppVars server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("AppVars server stopped");
    Ok(())
}

/// Build the shared application state.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let root_key = match (&config.root_key, &config.storage_backend) {
        (Some(key), _) => key.clone(),
        (None, StorageBackendType::Memory) => {
            warn!("APPVARS_ROOT_KEY not set, using an ephemeral key; secrets will not survive a restart");
            EncryptionKey::generate()
        }
        (None, StorageBackendType::Postgres { .. }) => {
            anyhow::bail!("APPVARS_ROOT_KEY is required with persistent storage");
        }
    };

    let storage: Arc<dyn StorageBackend> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            let backend = MemoryBackend::new();
            for (project_key, application) in &config.applications {
                let id = backend.create_application(project_key, application).await;
                info!(
                    project_key = %project_key,
                    application = %application,
                    application_id = %id,
                    "application registered"
                );
            }
            Arc::new(backend)
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            if !config.applications.is_empty() {
                warn!("APPVARS_APPLICATIONS is ignored with PostgreSQL storage");
            }
            Arc::new(
                appvars_storage::PostgresBackend::connect(url)
                    .await
                    .context("failed to connect to PostgreSQL storage")?,
            )
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!("PostgreSQL backend requested but feature 'postgres-backend' is not enabled");
        }
    };

    let codec = AesGcmCodec::derive(&root_key).context("failed to derive variable key")?;

    if config.admin_token.is_none() {
        warn!("APPVARS_ADMIN_TOKEN not set, no caller can read plaintext values");
    }

    Ok(Arc::new(AppState::new(
        storage,
        Arc::new(codec),
        config.admin_token.clone(),
    )))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
