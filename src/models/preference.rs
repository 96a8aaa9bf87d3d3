use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

/// Category constants recognised by the post core (spec §3 `Preference`).
pub mod category {
    pub const DIRECT_CHANNEL_SHOW: &str = "direct_channel_show";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const DISPLAY_SETTINGS: &str = "display_settings";
    pub const FLAGGED_POST: &str = "flagged_post";
}

pub mod name {
    pub const EMAIL_INTERVAL: &str = "email_interval";
    pub const NAME_FORMAT: &str = "name_format";
}

/// Recognised values for `notifications/email_interval` (spec §4.D step 6).
/// Any other value is treated as "batch" by the dispatcher.
pub mod email_interval_value {
    pub const IMMEDIATE: &str = "immediate";
}

/// `(user_id, category, name) -> value` (spec §3 `Preference`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Preference {
    pub user_id: Id,
    pub category: String,
    pub name: String,
    pub value: String,
}
