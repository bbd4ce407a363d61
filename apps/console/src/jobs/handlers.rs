//! Axum route handlers for job progress, cancellation and download.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::jobs::{JobResult, JobState};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobStarted {
    pub job_id: String,
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobState>, AppError> {
    state
        .jobs
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Proceso no encontrado.".to_string()))
}

/// DELETE /api/v1/jobs/:id
///
/// Aborts the in-flight backend call. The backend may still finish its own
/// work; the result is simply never collected.
pub async fn handle_cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobState>, AppError> {
    state
        .jobs
        .cancel(&job_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Proceso no encontrado.".to_string()))
}

/// GET /api/v1/jobs/:id/download
pub async fn handle_download_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    match state.jobs.result(&job_id) {
        JobResult::NotFound => Err(AppError::NotFound("Proceso no encontrado.".to_string())),
        JobResult::NotReady(job) => Err(AppError::Conflict(format!(
            "El proceso aun no ha finalizado correctamente ({}).",
            job.msg
        ))),
        JobResult::Ready { state: job, bytes } => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                job.file_name.replace('"', "_")
            );
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, job.kind.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response())
        }
    }
}
