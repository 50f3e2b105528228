mod backend_client;
mod config;
mod errors;
mod models;
mod routes;
mod session_store;
mod state;
mod workflow;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend_client::HttpBackend;
use crate::config::Config;
use crate::routes::build_router;
use crate::session_store::FileSessionStore;
use crate::state::AppState;
use crate::workflow::progress::{ProgressEvent, ProgressReporter};
use crate::workflow::{Orchestrator, WorkflowOptions};

const PROGRESS_EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting applier v{}", env!("CARGO_PKG_VERSION"));

    // Initialize automation backend client
    let backend = HttpBackend::new(
        &config.backend_url,
        config.backend_timeout,
        config.bulk_apply_timeout,
    )?;
    info!("Automation backend: {}", config.backend_url);

    // Initialize session store
    let store = FileSessionStore::new(config.session_store_path.clone());
    info!("Session store: {}", store.path().display());

    let progress = ProgressReporter::new(PROGRESS_EVENT_CAPACITY);
    tokio::spawn(log_progress(progress.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(backend),
        Arc::new(store),
        progress.clone(),
        WorkflowOptions {
            max_code_attempts: config.max_code_attempts,
        },
    ));

    let session = orchestrator.resume_session().await;
    info!("Session resumed in stage {:?}", session.stage);

    let state = AppState {
        orchestrator,
        progress,
    };

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Mirrors progress events into the log, with running totals after each run.
async fn log_progress(progress: ProgressReporter) {
    let mut events = progress.subscribe();
    loop {
        match events.recv().await {
            Ok(ProgressEvent::BulkApplyFinished { run_id, .. }) => {
                let stats = progress.snapshot().stats;
                info!(
                    %run_id,
                    "Totals after {} runs: {} succeeded, {} failed",
                    stats.runs_completed, stats.total_succeeded, stats.total_failed
                );
            }
            Ok(event) => tracing::debug!(?event, "progress"),
            Err(RecvError::Lagged(skipped)) => warn!("Progress log skipped {skipped} events"),
            Err(RecvError::Closed) => break,
        }
    }
}
