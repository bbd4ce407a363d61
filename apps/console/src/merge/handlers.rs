//! Axum route handler for the merge step.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::errors::AppError;
use crate::export::naming::merge_download_name;
use crate::jobs::handlers::JobStarted;
use crate::jobs::JobKind;
use crate::merge::{validate_merge, MergeForm};
use crate::routes::form::FormFields;
use crate::state::AppState;

/// POST /api/v1/merge
///
/// Multipart fields: `source`, `master`, `hdr_date`, `use_default_master`.
/// Starts the merge as a background job; the merged workbook is served from
/// `/api/v1/jobs/:id/download` under the technicians file's name.
pub async fn handle_start_merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobStarted>), AppError> {
    let mut form = FormFields::read(multipart).await?;
    let request = validate_merge(MergeForm {
        source: form.take_file("source"),
        master: form.take_file("master"),
        hdr_date: form.text("hdr_date").map(str::to_string),
        use_default_master: form.text("use_default_master").map(str::to_string),
    })?;

    let file_name = merge_download_name(Some(&request.source.name), request.hdr_date);
    let backend = state.backend.clone();
    let job_id = state.jobs.start(JobKind::Merge, file_name, move |progress| async move {
        backend.merge(request, progress).await
    });
    info!(%job_id, "Merge job queued");

    Ok((StatusCode::ACCEPTED, Json(JobStarted { job_id })))
}
