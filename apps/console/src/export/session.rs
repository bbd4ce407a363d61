use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend_client::UploadFile;
use crate::models::block::{Block, PreviewResponse};
use crate::ordering::apply_default_order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub ok: bool,
    pub message: String,
}

/// Block order and exclusions as the export endpoint expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSelection {
    pub orden: Vec<String>,
    pub excluir: Vec<String>,
}

/// One analyzed workbook and the user's ordering choices for it.
#[derive(Debug, Clone)]
pub struct ExportSession {
    pub id: Uuid,
    pub file: UploadFile,
    pub hoja_base: Option<String>,
    pub pdf_date: Option<NaiveDate>,
    pub blocks: Vec<Block>,
    pub analysis: AnalysisStatus,
    pub created_at: DateTime<Utc>,
}

impl ExportSession {
    pub fn new(file: UploadFile, hoja_base: Option<String>, pdf_date: Option<NaiveDate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            hoja_base,
            pdf_date,
            blocks: Vec::new(),
            analysis: AnalysisStatus {
                ok: true,
                message: "Analizando XLS...".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    /// Replaces the block list with a fresh analysis, in default order.
    pub fn replace_blocks(&mut self, preview: PreviewResponse) {
        let blocks: Vec<Block> = preview.blocks.into_iter().map(Block::from).collect();
        self.blocks = apply_default_order(&blocks);
        self.analysis = AnalysisStatus {
            ok: true,
            message: format!("Detectados {} vendedores.", preview.count),
        };
    }

    pub fn fail_analysis(&mut self, message: impl Into<String>) {
        self.blocks.clear();
        self.analysis = AnalysisStatus {
            ok: false,
            message: message.into(),
        };
    }

    /// Swaps the block at `index` with its neighbour. Returns `false` and
    /// leaves the order alone when the neighbour does not exist.
    pub fn move_block(&mut self, index: usize, direction: MoveDirection) -> bool {
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => index.checked_add(1),
        };
        match target {
            Some(target) if index < self.blocks.len() && target < self.blocks.len() => {
                self.blocks.swap(index, target);
                true
            }
            _ => false,
        }
    }

    pub fn toggle_include(&mut self, id: &str) -> bool {
        match self.blocks.iter_mut().find(|b| b.id == id) {
            Some(block) => {
                block.include = !block.include;
                true
            }
            None => false,
        }
    }

    /// Re-applies the default order; include flags survive.
    pub fn reset_default_order(&mut self) {
        self.blocks = apply_default_order(&self.blocks);
    }

    pub fn excluded_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.include).count()
    }

    pub fn selection(&self) -> Option<BlockSelection> {
        if self.blocks.is_empty() {
            return None;
        }
        Some(BlockSelection {
            orden: self.blocks.iter().map(|b| b.id.clone()).collect(),
            excluir: self
                .blocks
                .iter()
                .filter(|b| !b.include)
                .map(|b| b.id.clone())
                .collect(),
        })
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            file_name: self.file.name.clone(),
            hoja_base: self.hoja_base.clone(),
            pdf_date: self.pdf_date,
            analysis: self.analysis.clone(),
            blocks: self
                .blocks
                .iter()
                .enumerate()
                .map(|(i, b)| BlockRow {
                    position: i + 1,
                    id: b.id.clone(),
                    name: b.name.clone(),
                    sheet: b.sheet.clone(),
                    include: b.include,
                })
                .collect(),
            excluded_count: self.excluded_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRow {
    pub position: usize,
    pub id: String,
    pub name: String,
    pub sheet: String,
    pub include: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: Uuid,
    pub file_name: String,
    pub hoja_base: Option<String>,
    pub pdf_date: Option<NaiveDate>,
    pub analysis: AnalysisStatus,
    pub blocks: Vec<BlockRow>,
    pub excluded_count: usize,
}

/// In-memory export sessions, keyed by id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, ExportSession>>>,
}

impl SessionStore {
    pub async fn insert(&self, session: ExportSession) {
        self.inner.write().await.insert(session.id, session);
    }

    pub async fn get(&self, id: Uuid) -> Option<ExportSession> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }

    /// Runs `f` against the stored session. `None` when the id is unknown.
    pub async fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut ExportSession) -> T) -> Option<T> {
        let mut sessions = self.inner.write().await;
        sessions.get_mut(&id).map(f)
    }

    /// Drops sessions created before `cutoff`. Returns how many were dropped.
    pub async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.created_at >= cutoff);
        before - sessions.len()
    }
}
