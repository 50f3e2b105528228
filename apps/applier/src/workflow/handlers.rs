use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{ApplyBatchResult, Session, Stage};
use crate::state::AppState;
use crate::workflow::progress::ProgressSnapshot;

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub stage: Stage,
    pub phone: Option<String>,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub busy: bool,
}

impl SessionView {
    fn new(session: Session, busy: bool) -> Self {
        Self {
            stage: session.stage,
            phone: session.phone,
            authenticated_at: session.authenticated_at,
            busy,
        }
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub phone: String,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Deserialize)]
pub struct BulkApplyRequest {
    pub job_keyword: String,
    pub city: String,
    pub count: u32,
}

fn view(state: &AppState, session: Session) -> Json<SessionView> {
    Json(SessionView::new(session, state.orchestrator.is_busy()))
}

/// GET /api/v1/session
pub async fn handle_get_session(State(state): State<AppState>) -> Json<SessionView> {
    let session = state.orchestrator.session().await;
    view(&state, session)
}

/// POST /api/v1/login
pub async fn handle_start_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.orchestrator.start_login(req.phone.trim()).await?;
    Ok(view(&state, session))
}

/// POST /api/v1/login/verify
pub async fn handle_submit_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.orchestrator.submit_code(req.code.trim()).await?;
    Ok(view(&state, session))
}

/// POST /api/v1/login/cancel
pub async fn handle_cancel_login(
    State(state): State<AppState>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.orchestrator.cancel_login().await?;
    Ok(view(&state, session))
}

/// POST /api/v1/logout
pub async fn handle_logout(State(state): State<AppState>) -> Result<Json<SessionView>, AppError> {
    let session = state.orchestrator.logout().await?;
    Ok(view(&state, session))
}

/// POST /api/v1/apply
/// The run is detached from the request so a dropped client connection
/// cannot abort a batch the backend is already executing.
pub async fn handle_bulk_apply(
    State(state): State<AppState>,
    Json(req): Json<BulkApplyRequest>,
) -> Result<Json<ApplyBatchResult>, AppError> {
    let orchestrator = state.orchestrator.clone();
    let result = tokio::spawn(async move {
        orchestrator
            .run_bulk_apply(&req.job_keyword, &req.city, req.count)
            .await
    })
    .await
    .map_err(|e| AppError::BulkApply(format!("Bulk apply task aborted: {e}")))??;
    Ok(Json(result))
}

/// GET /api/v1/progress
pub async fn handle_get_progress(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(state.progress.snapshot())
}
