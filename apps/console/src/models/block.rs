use serde::{Deserialize, Serialize};

/// One vendor section detected in the formatted workbook.
/// Its position in the export order is its index in the owning `Vec<Block>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub name: String,
    pub sheet: String,
    pub include: bool,
}

/// Block as reported by the backend's preview endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sheet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub blocks: Vec<PreviewBlock>,
    pub count: usize,
}

impl From<PreviewBlock> for Block {
    fn from(preview: PreviewBlock) -> Self {
        Self {
            id: preview.id,
            name: preview.name,
            sheet: preview.sheet,
            include: true,
        }
    }
}
