use std::sync::Arc;

use crate::workflow::progress::ProgressReporter;
use crate::workflow::Orchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The one orchestrator driving this process's session.
    pub orchestrator: Arc<Orchestrator>,
    /// Read side of the progress sink; the orchestrator holds the write side.
    pub progress: ProgressReporter,
}
