//! Axum route handlers for export sessions.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend_client::ExportRequest;
use crate::errors::AppError;
use crate::export::naming::{build_zip_name, is_xls_file, parse_date_from_filename, parse_form_date};
use crate::export::session::{ExportSession, MoveDirection, SessionView};
use crate::jobs::handlers::JobStarted;
use crate::jobs::JobKind;
use crate::routes::form::FormFields;
use crate::state::AppState;

pub const MISSING_EXCEL: &str = "Adjunta el XLS previamente generado en /merge.";
pub const ONLY_XLS: &str = "Solo se permiten archivos .XLS en esta pantalla.";
pub const MISSING_PDF_DATE: &str = "Selecciona la fecha usada al generar el Excel.";

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// `Some("")` clears the sheet filter; `None` keeps the current one.
    pub hoja_base: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StartExportRequest {
    pub pdf_date: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/export/sessions
///
/// Accepts the formatted XLS, analyzes it and returns the blocks in default
/// order. A failed analysis still opens the session so the user can retry.
pub async fn handle_create_session(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let mut form = FormFields::read(multipart).await?;

    let excel = form
        .take_file("excel")
        .ok_or_else(|| AppError::Validation(MISSING_EXCEL.to_string()))?;
    if !is_xls_file(&excel.name) {
        return Err(AppError::Validation(ONLY_XLS.to_string()));
    }

    let hoja_base = form.text("hoja_base").map(str::to_string);
    let pdf_date = match form.text("pdf_date") {
        Some(raw) => Some(parse_form_date(raw).ok_or_else(|| {
            AppError::Validation(format!("Fecha invalida: {raw} (use AAAA-MM-DD)"))
        })?),
        None => parse_date_from_filename(&excel.name),
    };

    let mut session = ExportSession::new(excel, hoja_base, pdf_date);
    analyze(&state, &mut session).await;
    let view = session.view();
    state.sessions.insert(session).await;

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/export/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;
    Ok(Json(session.view()))
}

/// DELETE /api/v1/export/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(session_id))
    }
}

/// POST /api/v1/export/sessions/:id/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<AnalyzeRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let mut session = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    if let Some(Json(AnalyzeRequest {
        hoja_base: Some(hoja),
    })) = request
    {
        let hoja = hoja.trim();
        session.hoja_base = (!hoja.is_empty()).then(|| hoja.to_string());
    }

    // the backend call is slow, so run it on a copy and write back after
    analyze(&state, &mut session).await;
    let view = session.view();
    let analyzed = session;
    state
        .sessions
        .update(session_id, move |stored| {
            stored.hoja_base = analyzed.hoja_base;
            stored.blocks = analyzed.blocks;
            stored.analysis = analyzed.analysis;
        })
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    Ok(Json(view))
}

/// POST /api/v1/export/sessions/:id/blocks/:index/move
///
/// Moving past either end leaves the order as it is.
pub async fn handle_move_block(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(Uuid, usize)>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .update(session_id, |session| {
            if index >= session.blocks.len() {
                return Err(AppError::NotFound(format!("Bloque {index} no existe")));
            }
            session.move_block(index, request.direction);
            Ok(session.view())
        })
        .await
        .ok_or_else(|| session_not_found(session_id))??;
    Ok(Json(view))
}

/// POST /api/v1/export/sessions/:id/blocks/toggle
pub async fn handle_toggle_block(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ToggleRequest>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .update(session_id, |session| {
            if !session.toggle_include(&request.id) {
                return Err(AppError::NotFound(format!("Bloque {} no existe", request.id)));
            }
            Ok(session.view())
        })
        .await
        .ok_or_else(|| session_not_found(session_id))??;
    Ok(Json(view))
}

/// POST /api/v1/export/sessions/:id/default-order
pub async fn handle_default_order(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let view = state
        .sessions
        .update(session_id, |session| {
            session.reset_default_order();
            session.view()
        })
        .await
        .ok_or_else(|| session_not_found(session_id))?;
    Ok(Json(view))
}

/// POST /api/v1/export/sessions/:id/export
///
/// Starts the PDF export as a background job. Poll `/api/v1/jobs/:id`.
pub async fn handle_start_export(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    request: Option<Json<StartExportRequest>>,
) -> Result<(StatusCode, Json<JobStarted>), AppError> {
    let requested_date = match request.and_then(|Json(r)| r.pdf_date) {
        Some(raw) if !raw.trim().is_empty() => Some(parse_form_date(&raw).ok_or_else(|| {
            AppError::Validation(format!("Fecha invalida: {raw} (use AAAA-MM-DD)"))
        })?),
        _ => None,
    };

    let session = state
        .sessions
        .update(session_id, |session| {
            if requested_date.is_some() {
                session.pdf_date = requested_date;
            }
            session.clone()
        })
        .await
        .ok_or_else(|| session_not_found(session_id))?;

    let pdf_date = session
        .pdf_date
        .ok_or_else(|| AppError::Validation(MISSING_PDF_DATE.to_string()))?;

    let zip_name = build_zip_name(Some(&session.file.name));
    let export = ExportRequest {
        selection: session.selection(),
        excel: session.file,
        hoja_base: session.hoja_base,
        pdf_date: Some(pdf_date),
    };

    let backend = state.backend.clone();
    let job_id = state.jobs.start(JobKind::Export, zip_name, move |progress| async move {
        backend.export(export, progress).await
    });
    info!(%session_id, %job_id, "Export job queued");

    Ok((StatusCode::ACCEPTED, Json(JobStarted { job_id })))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn analyze(state: &AppState, session: &mut ExportSession) {
    match state
        .backend
        .preview(&session.file, session.hoja_base.as_deref())
        .await
    {
        Ok(preview) => {
            info!(
                file = %session.file.name,
                count = preview.count,
                "Workbook analyzed"
            );
            session.replace_blocks(preview);
        }
        Err(e) => {
            warn!(file = %session.file.name, "Analysis failed: {e}");
            session.fail_analysis(e.to_string());
        }
    }
}

fn session_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Sesion {id} no encontrada"))
}
