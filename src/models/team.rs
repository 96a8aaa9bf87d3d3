use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

/// Spec §3 `Channel`'s sibling external entity — referenced for cross-team
/// deep-link resolution in the email dispatcher (SPEC_FULL §4.D) and for
/// team-scoped webhook/search lookups.
///
/// `owner_id` stands in for "edit-others permission" the same way the
/// teacher's `Server.owner_id` does (SPEC_FULL §4.C) — there's no separate
/// roles/ACL system here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Team {
    pub id: Id,
    pub owner_id: Id,
    pub name: String,
    pub display_name: String,
    pub create_at: DateTime<Utc>,
    pub delete_at: i64,
}
