use std::sync::Arc;

use crate::backend_client::SpreadsheetBackend;
use crate::config::Config;
use crate::export::session::SessionStore;
use crate::jobs::JobStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Swappable so routes can run against a fake backend in tests.
    pub backend: Arc<dyn SpreadsheetBackend>,
    pub sessions: SessionStore,
    pub jobs: JobStore,
    pub config: Config,
}

impl AppState {
    /// Periodically drops finished jobs and export sessions older than the
    /// configured retention window.
    pub fn spawn_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let retention = chrono::Duration::from_std(state.config.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(2));
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let cutoff = chrono::Utc::now() - retention;
                let jobs = state.jobs.purge_finished_before(cutoff);
                let sessions = state.sessions.purge_created_before(cutoff).await;
                if jobs + sessions > 0 {
                    tracing::debug!(jobs, sessions, "Retention sweep");
                }
            }
        })
    }
}
