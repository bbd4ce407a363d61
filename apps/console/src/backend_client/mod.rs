/// Backend Client: the only code that talks to the spreadsheet backend.
///
/// The backend drives Excel over COM and does the real work: merging the
/// technicians workbook into the master, detecting vendor blocks, and
/// printing PDFs. Everything here is request/response plumbing around it.
///
/// Handlers depend on the `SpreadsheetBackend` trait, never on reqwest, so the
/// routes can be exercised against an in-process fake.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::NaiveDate;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use thiserror::Error;
use tracing::{debug, warn};

use crate::export::session::BlockSelection;
use crate::models::block::PreviewResponse;
use crate::models::master::MasterInfo;

/// Upload covers 0..70 of a job's progress; the download fills the rest.
pub const UPLOAD_DONE_PCT: u8 = 70;
const DOWNLOAD_SPAN_PCT: u64 = 30;
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Receives overall progress in percent (0-100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Error de red")]
    Network(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Respuesta invalida del backend: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A workbook received from the user, forwarded as a multipart file part.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Bytes,
}

impl UploadFile {
    fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn to_part(&self) -> Part {
        Part::stream_with_length(Body::from(self.bytes.clone()), self.len())
            .file_name(self.name.clone())
    }

    /// Streams the file in chunks, reporting each one to `tracker` as the
    /// request body pulls it.
    fn to_tracked_part(&self, tracker: &Arc<UploadTracker>) -> Part {
        let chunks: Vec<Bytes> = (0..self.bytes.len())
            .step_by(UPLOAD_CHUNK)
            .map(|start| {
                let end = (start + UPLOAD_CHUNK).min(self.bytes.len());
                self.bytes.slice(start..end)
            })
            .collect();
        let tracker = Arc::clone(tracker);
        let stream = futures_util::stream::iter(chunks).map(move |chunk| {
            tracker.advance(chunk.len() as u64);
            Ok::<_, std::io::Error>(chunk)
        });
        Part::stream_with_length(Body::wrap_stream(stream), self.len())
            .file_name(self.name.clone())
    }
}

/// Maps bytes sent across every file part of one request onto 0..70.
struct UploadTracker {
    total: u64,
    sent: AtomicU64,
    progress: ProgressFn,
}

impl UploadTracker {
    fn new(total: u64, progress: ProgressFn) -> Arc<Self> {
        Arc::new(Self {
            total,
            sent: AtomicU64::new(0),
            progress,
        })
    }

    fn advance(&self, n: u64) {
        let sent = self.sent.fetch_add(n, Ordering::Relaxed) + n;
        (self.progress)(upload_pct(sent, self.total));
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub excel: UploadFile,
    pub hoja_base: Option<String>,
    pub pdf_date: Option<NaiveDate>,
    /// Omitted when the session has no analyzed blocks.
    pub selection: Option<BlockSelection>,
}

#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub source: UploadFile,
    pub master: Option<UploadFile>,
    pub hdr_date: Option<NaiveDate>,
    pub use_default_master: bool,
}

#[async_trait]
pub trait SpreadsheetBackend: Send + Sync {
    async fn default_info(&self) -> Result<MasterInfo, BackendError>;

    async fn preview(
        &self,
        excel: &UploadFile,
        hoja_base: Option<&str>,
    ) -> Result<PreviewResponse, BackendError>;

    /// Returns the ZIP with one PDF per vendor plus the consolidated PDF.
    async fn export(&self, request: ExportRequest, progress: ProgressFn)
        -> Result<Bytes, BackendError>;

    /// Returns the merged `.xls` workbook.
    async fn merge(&self, request: MergeRequest, progress: ProgressFn)
        -> Result<Bytes, BackendError>;
}

/// reqwest implementation of `SpreadsheetBackend`.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build backend HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_with_progress(
        &self,
        path: &str,
        form: Form,
        progress: ProgressFn,
    ) -> Result<Bytes, BackendError> {
        let response = self.client.post(self.url(path)).multipart(form).send().await?;
        let response = ensure_success(response).await?;
        // Empty uploads never tick the tracker.
        progress(UPLOAD_DONE_PCT);
        read_with_progress(response, &progress).await
    }
}

#[async_trait]
impl SpreadsheetBackend for HttpBackend {
    async fn default_info(&self) -> Result<MasterInfo, BackendError> {
        let response = self.client.get(self.url("/master/default-info")).send().await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn preview(
        &self,
        excel: &UploadFile,
        hoja_base: Option<&str>,
    ) -> Result<PreviewResponse, BackendError> {
        let mut form = Form::new().part("excel", excel.to_part());
        if let Some(hoja) = hoja_base.map(str::trim).filter(|h| !h.is_empty()) {
            form = form.text("hoja_base", hoja.to_string());
        }

        debug!("Requesting block preview for {}", excel.name);
        let response = self
            .client
            .post(self.url("/pdf/preview-upload"))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn export(
        &self,
        request: ExportRequest,
        progress: ProgressFn,
    ) -> Result<Bytes, BackendError> {
        let tracker = UploadTracker::new(request.excel.len(), progress.clone());
        let mut form = Form::new().part("excel", request.excel.to_tracked_part(&tracker));
        if let Some(hoja) = request
            .hoja_base
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
        {
            form = form.text("hoja_base", hoja.to_string());
        }
        if let Some(date) = request.pdf_date {
            form = form.text("pdf_date", date.format("%Y-%m-%d").to_string());
        }
        if let Some(selection) = &request.selection {
            form = form
                .text("orden", serde_json::to_string(&selection.orden)?)
                .text("excluir", serde_json::to_string(&selection.excluir)?);
        }

        self.post_with_progress("/pdf/export-upload", form, progress)
            .await
    }

    async fn merge(
        &self,
        request: MergeRequest,
        progress: ProgressFn,
    ) -> Result<Bytes, BackendError> {
        let master = request.master.as_ref().filter(|_| !request.use_default_master);
        let total = request.source.len() + master.map_or(0, UploadFile::len);
        let tracker = UploadTracker::new(total, progress.clone());

        let mut form = Form::new().part("source", request.source.to_tracked_part(&tracker));
        if let Some(master) = master {
            form = form.part("master", master.to_tracked_part(&tracker));
        }
        if let Some(date) = request.hdr_date {
            form = form.text("hdr_date", date.format("%Y-%m-%d").to_string());
        }
        let flag = if request.use_default_master { "1" } else { "0" };
        form = form.text("use_default_master", flag);

        self.post_with_progress("/merge", form, progress).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body, status.as_u16());
    warn!("Backend returned {}: {}", status, message);
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_with_progress(
    mut response: Response,
    progress: &ProgressFn,
) -> Result<Bytes, BackendError> {
    let total = response.content_length().filter(|t| *t > 0);
    let mut buf = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        buf.extend_from_slice(&chunk);
        if let Some(total) = total {
            progress(download_pct(buf.len() as u64, total));
        }
    }
    Ok(buf.freeze())
}

fn upload_pct(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return UPLOAD_DONE_PCT;
    }
    (sent.min(total) * u64::from(UPLOAD_DONE_PCT) / total) as u8
}

/// Maps downloaded bytes onto the 70-100 band.
fn download_pct(loaded: u64, total: u64) -> u8 {
    let done = loaded.min(total) * DOWNLOAD_SPAN_PCT / total;
    UPLOAD_DONE_PCT + done as u8
}

/// Picks the message to show for a failed backend call: the JSON `detail`
/// field when there is one, else the raw body, else the status line.
pub fn extract_error_message(body: &str, status: u16) -> String {
    if body.trim().is_empty() {
        return format!("HTTP {status}");
    }
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
        match parsed.get("detail") {
            Some(serde_json::Value::String(detail)) if !detail.is_empty() => {
                return detail.clone()
            }
            Some(serde_json::Value::Null) | Some(serde_json::Value::String(_)) | None => {}
            Some(other) => return other.to_string(),
        }
    }
    body.to_string()
}
