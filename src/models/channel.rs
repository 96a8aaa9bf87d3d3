use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Open,
    Private,
    Direct,
    Group,
}

/// Spec §3 `Channel` (external to the post core, but the core reads it
/// constantly, so it's modelled here rather than re-derived per call site).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    pub id: Id,
    pub team_id: Id,
    pub r#type: ChannelType,
    pub display_name: String,
    /// For a direct channel, the two member user-ids joined by `__`.
    pub name: String,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
    pub delete_at: i64,
}

impl Channel {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }

    /// Parses `{user_a}__{user_b}` back into the two member ids. Only
    /// meaningful for `ChannelType::Direct`.
    pub fn direct_member_ids(&self) -> Option<(Id, Id)> {
        let (a, b) = self.name.split_once("__")?;
        Some((a.parse().ok()?, b.parse().ok()?))
    }

    pub fn direct_name(a: Id, b: Id) -> String {
        if a.to_string() < b.to_string() {
            format!("{a}__{b}")
        } else {
            format!("{b}__{a}")
        }
    }
}
