use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

/// Spec §3 `FileInfo`. `post_id` is null until `AttachToPost` runs; a file
/// attached via the legacy `filenames` field on the post never gets a row
/// here at all (see SPEC_FULL §9 legacy-filename note, carried from
/// `original_source/`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: Id,
    pub post_id: Option<Id>,
    pub name: String,
    pub mime_type: String,
    pub create_at: DateTime<Utc>,
    pub delete_at: i64,
}

impl FileInfo {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}
