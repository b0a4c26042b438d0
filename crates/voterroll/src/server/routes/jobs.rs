//! Job listing and management endpoints

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::ImportError;
use crate::pipeline::{DeletionReceipt, JobSummary, ReconcileOutcome};
use crate::server::response::ApiResponse;
use crate::server::routes::run_blocking;
use crate::server::state::AppState;
use crate::worker::{ImportJob, JobLocation};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    /// False when a processing run was already active.
    pub started: bool,
}

/// GET /api/import/jobs - recent jobs, newest first
pub async fn list(State(state): State<AppState>) -> Result<ApiResponse<Vec<JobSummary>>, ImportError> {
    let service = state.service;
    Ok(ApiResponse::ok(run_blocking(move || service.list_jobs()).await?))
}

/// POST /api/import/process - start the queue processor
pub async fn process(State(state): State<AppState>) -> ApiResponse<TriggerResponse> {
    ApiResponse::ok(TriggerResponse {
        started: state.service.trigger_processing(),
    })
}

/// PATCH /api/import/jobs/:id - correct booth and address
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(location): Json<JobLocation>,
) -> Result<ApiResponse<ReconcileOutcome>, ImportError> {
    let service = state.service;
    Ok(ApiResponse::ok(
        run_blocking(move || service.update_job(id, location)).await?,
    ))
}

/// DELETE /api/import/jobs/:id
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<DeletionReceipt>, ImportError> {
    let service = state.service;
    Ok(ApiResponse::ok(run_blocking(move || service.delete_job(id)).await?))
}

/// POST /api/import/jobs/:id/reset - put a job back in the queue
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<ApiResponse<ImportJob>, ImportError> {
    let service = state.service;
    Ok(ApiResponse::ok(run_blocking(move || service.reset_job(id)).await?))
}
