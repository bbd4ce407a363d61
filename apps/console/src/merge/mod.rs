// Copy-to-master step: technicians workbook + master workbook -> merged XLS.

pub mod handlers;

use chrono::NaiveDate;

use crate::backend_client::{MergeRequest, UploadFile};
use crate::errors::AppError;
use crate::export::naming::{is_xls_file, parse_form_date};

pub const MISSING_SOURCE: &str = "Carga el archivo de tecnicos (.XLS).";
pub const MISSING_MASTER: &str = "Carga el maestro o activa \"Usar maestro por defecto\".";

/// Raw merge form, before validation.
#[derive(Debug, Default)]
pub struct MergeForm {
    pub source: Option<UploadFile>,
    pub master: Option<UploadFile>,
    pub hdr_date: Option<String>,
    pub use_default_master: Option<String>,
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Checks the merge form the way the upload screen does and builds the
/// backend request. The default master is used unless explicitly disabled.
pub fn validate_merge(form: MergeForm) -> Result<MergeRequest, AppError> {
    let source = form
        .source
        .ok_or_else(|| AppError::Validation(MISSING_SOURCE.to_string()))?;
    if !is_xls_file(&source.name) {
        return Err(AppError::Validation(
            crate::export::handlers::ONLY_XLS.to_string(),
        ));
    }

    let use_default_master = match form.use_default_master.as_deref() {
        Some(raw) => parse_flag(raw).ok_or_else(|| {
            AppError::Validation(format!("use_default_master invalido: {raw}"))
        })?,
        None => true,
    };

    let master = if use_default_master {
        None
    } else {
        let master = form
            .master
            .ok_or_else(|| AppError::Validation(MISSING_MASTER.to_string()))?;
        if !is_xls_file(&master.name) {
            return Err(AppError::Validation(
                crate::export::handlers::ONLY_XLS.to_string(),
            ));
        }
        Some(master)
    };

    let hdr_date: Option<NaiveDate> = match form.hdr_date.as_deref() {
        Some(raw) => Some(parse_form_date(raw).ok_or_else(|| {
            AppError::Validation(format!("Fecha invalida: {raw} (use AAAA-MM-DD)"))
        })?),
        None => None,
    };

    Ok(MergeRequest {
        source,
        master,
        hdr_date,
        use_default_master,
    })
}
