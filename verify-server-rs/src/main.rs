mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::collaborators::Notifier;
use crate::services::control_plane::ControlPlaneClient;
use crate::services::notifier::WebhookNotifier;
use crate::services::orchestrator::{Collaborators, Orchestrator};
use crate::state::AppState;
use manifest_agent::manifest::store::{HttpObjectStore, LocalObjectStore};
use manifest_agent::{ManifestStore, ObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    tracing::info!("Starting verify server on port {}", config.port);
    if config.monitored_resource_id.is_empty() {
        tracing::warn!("MONITORED_RESOURCE_ID is not set, completed backups of any resource will be verified");
    }

    let orchestrator = Orchestrator::new(config.verify_config(), build_collaborators(&config)?);
    let state = Arc::new(AppState::new(config.clone(), orchestrator));

    // Build router
    let app = routes::create_router(state.clone());

    // Start HTTP server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.cancel.clone()))
        .await?;

    // Cancelled runs still alert and tear down before the process exits
    tracing::info!("Shutting down...");
    state.cancel.cancel();
    if !state.runs.drain(Duration::from_secs(config.shutdown_grace_secs)).await {
        for run in state.runs.list().iter().filter(|r| r.finished_at.is_none()) {
            if run.state.is_terminal() {
                tracing::warn!(run_id = %run.id, "Run still cleaning up at shutdown");
            } else {
                tracing::warn!(run_id = %run.id, state = %run.state, "Run still in progress at shutdown");
            }
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}

fn build_collaborators(config: &AppConfig) -> anyhow::Result<Collaborators> {
    let object_store: Arc<dyn ObjectStore> = match (&config.store_url, &config.store_dir) {
        (Some(url), _) => Arc::new(HttpObjectStore::new(url, config.store_token.clone())?),
        (None, Some(dir)) => Arc::new(LocalObjectStore::new(dir)),
        (None, None) => anyhow::bail!("either STORE_URL or STORE_DIR must be set"),
    };

    let control_plane = Arc::new(ControlPlaneClient::new(
        &config.control_plane_url,
        config.control_plane_token.clone(),
    )?);

    let notifier = config.notify_url.as_ref().map(|url| {
        tracing::info!("Alerts go to {}", url);
        Arc::new(WebhookNotifier::new(url.clone())) as Arc<dyn Notifier>
    });

    Ok(Collaborators {
        backup: control_plane.clone(),
        exposure: control_plane.clone(),
        execution: control_plane,
        manifests: ManifestStore::new(object_store, config.bucket.clone()),
        notifier,
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
