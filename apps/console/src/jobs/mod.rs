//! Background jobs for the long backend calls (merge and PDF export).
//!
//! A job runs as a tokio task and reports percent progress. It can be
//! cancelled while running, and keeps its result until it is evicted.

pub mod handlers;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend_client::{BackendError, ProgressFn};

pub const CANCELLED_MESSAGE: &str = "Proceso cancelado por el usuario.";
const JOB_ID_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Merge,
    Export,
}

impl JobKind {
    pub fn content_type(self) -> &'static str {
        match self {
            JobKind::Merge => "application/vnd.ms-excel",
            JobKind::Export => "application/zip",
        }
    }

    fn start_message(self) -> &'static str {
        match self {
            JobKind::Merge => "Procesando, por favor espera...",
            JobKind::Export => "Generando PDFs...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub id: String,
    pub kind: JobKind,
    pub pct: u8,
    pub msg: String,
    pub status: JobStatus,
    pub file_name: String,
    pub updated_at: DateTime<Utc>,
}

struct JobEntry {
    state: JobState,
    result: Option<Bytes>,
    abort: Option<AbortHandle>,
}

/// Outcome of asking for a job's result.
#[derive(Debug)]
pub enum JobResult {
    NotFound,
    NotReady(JobState),
    Ready { state: JobState, bytes: Bytes },
}

#[derive(Clone, Default)]
pub struct JobStore {
    inner: Arc<Mutex<HashMap<String, JobEntry>>>,
}

impl JobStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `run` as a job and returns its id right away.
    ///
    /// `run` receives a progress sink that feeds this job's percentage.
    pub fn start<F, Fut>(&self, kind: JobKind, file_name: String, run: F) -> String
    where
        F: FnOnce(ProgressFn) -> Fut,
        Fut: Future<Output = Result<Bytes, BackendError>> + Send + 'static,
    {
        let id = Uuid::new_v4().simple().to_string()[..JOB_ID_LEN].to_string();
        self.lock().insert(
            id.clone(),
            JobEntry {
                state: JobState {
                    id: id.clone(),
                    kind,
                    pct: 1,
                    msg: kind.start_message().to_string(),
                    status: JobStatus::Running,
                    file_name,
                    updated_at: Utc::now(),
                },
                result: None,
                abort: None,
            },
        );
        info!(job_id = %id, ?kind, "Job started");

        let progress: ProgressFn = {
            let store = self.clone();
            let id = id.clone();
            Arc::new(move |pct| store.set_progress(&id, pct))
        };
        let fut = run(progress);

        let store = self.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let outcome = fut.await;
            store.finish(&task_id, outcome);
        });

        if let Some(entry) = self.lock().get_mut(&id) {
            entry.abort = Some(handle.abort_handle());
        }
        id
    }

    /// Raises a running job's progress. Never moves it backwards.
    pub fn set_progress(&self, id: &str, pct: u8) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(id) {
            let state = &mut entry.state;
            if state.status == JobStatus::Running && pct > state.pct {
                state.pct = pct.min(100);
                state.updated_at = Utc::now();
            }
        }
    }

    fn finish(&self, id: &str, outcome: Result<Bytes, BackendError>) {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(id) else {
            return;
        };
        if entry.state.status != JobStatus::Running {
            return;
        }
        entry.abort = None;
        entry.state.updated_at = Utc::now();
        match outcome {
            Ok(bytes) => {
                info!(job_id = %id, size = bytes.len(), "Job finished");
                entry.state.pct = 100;
                entry.state.status = JobStatus::Done;
                entry.state.msg = match entry.state.kind {
                    JobKind::Merge => format!("Listo. Se genero {}.", entry.state.file_name),
                    JobKind::Export => format!("ZIP listo ({}).", entry.state.file_name),
                };
                entry.result = Some(bytes);
            }
            Err(e) => {
                warn!(job_id = %id, "Job failed: {e}");
                entry.state.pct = 0;
                entry.state.status = JobStatus::Error;
                entry.state.msg = e.to_string();
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<JobState> {
        self.lock().get(id).map(|e| e.state.clone())
    }

    /// Aborts a running job. Finished jobs are returned unchanged.
    pub fn cancel(&self, id: &str) -> Option<JobState> {
        let mut jobs = self.lock();
        let entry = jobs.get_mut(id)?;
        if entry.state.status == JobStatus::Running {
            if let Some(abort) = entry.abort.take() {
                abort.abort();
            }
            entry.state.status = JobStatus::Cancelled;
            entry.state.pct = 0;
            entry.state.msg = CANCELLED_MESSAGE.to_string();
            entry.state.updated_at = Utc::now();
            info!(job_id = %id, "Job cancelled");
        }
        Some(entry.state.clone())
    }

    pub fn result(&self, id: &str) -> JobResult {
        let jobs = self.lock();
        match jobs.get(id) {
            None => JobResult::NotFound,
            Some(entry) => match (&entry.state.status, &entry.result) {
                (JobStatus::Done, Some(bytes)) => JobResult::Ready {
                    state: entry.state.clone(),
                    bytes: bytes.clone(),
                },
                _ => JobResult::NotReady(entry.state.clone()),
            },
        }
    }

    /// Drops finished jobs last touched before `cutoff`. Running jobs stay.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, e| e.state.status == JobStatus::Running || e.state.updated_at >= cutoff);
        before - jobs.len()
    }
}
