use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::master::MasterInfo;
use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "cobranza-console"
    }))
}

#[derive(Debug, Serialize)]
pub struct MasterInfoResponse {
    #[serde(flatten)]
    pub info: MasterInfo,
    pub hint: String,
}

/// GET /api/v1/master/default-info
///
/// Doubles as the backend health check: it fails when the backend is down.
pub async fn handle_master_info(
    State(state): State<AppState>,
) -> Result<Json<MasterInfoResponse>, AppError> {
    let info = state.backend.default_info().await?;
    let hint = info.hint();
    Ok(Json(MasterInfoResponse { info, hint }))
}
