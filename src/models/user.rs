use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

/// Recognised `NotifyProps` keys (spec §3). Stored as a JSON object column;
/// wrapped here so callers read typed values instead of re-parsing strings
/// at every call site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifyProps(pub HashMap<String, String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSetting {
    All,
    Mention,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentsSetting {
    Any,
    Root,
    Never,
}

impl NotifyProps {
    /// `email`: default `true` unless explicitly `"false"`.
    pub fn email_enabled(&self) -> bool {
        self.0.get("email").map(|v| v != "false").unwrap_or(true)
    }

    pub fn push(&self) -> PushSetting {
        match self.0.get("push").map(String::as_str) {
            Some("all") => PushSetting::All,
            Some("none") => PushSetting::None,
            _ => PushSetting::Mention,
        }
    }

    /// An unset key falls back to `Never`, not `Root` — the original only
    /// ever treats `"any"`/`"root"` as opt-in; a profile whose value is the
    /// Go zero-value `""` matches neither, so it never gets thread-comment
    /// notifications until the user explicitly picks a setting.
    pub fn comments(&self) -> CommentsSetting {
        match self.0.get("comments").map(String::as_str) {
            Some("any") => CommentsSetting::Any,
            Some("root") => CommentsSetting::Root,
            _ => CommentsSetting::Never,
        }
    }

    pub fn mention_keys(&self) -> Vec<String> {
        self.0
            .get("mention_keys")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn first_name_enabled(&self) -> bool {
        self.0.get("first_name").map(|v| v == "true").unwrap_or(false)
    }

    /// `channel`: receive `@channel`/`@all`/`@here`. Default `true`.
    pub fn channel_mentions_enabled(&self) -> bool {
        self.0.get("channel").map(|v| v != "false").unwrap_or(true)
    }
}

/// Spec §3 `User / Profile`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub locale: String,
    pub email: String,
    pub delete_at: i64,
    pub notify_props: sqlx::types::Json<NotifyProps>,
}

impl Profile {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }

    pub fn notify(&self) -> &NotifyProps {
        &self.notify_props.0
    }
}

/// A single active session (spec §6.2 `Session.GetSessionsWithActiveDeviceIds`) —
/// one push notification is sent per session with a non-empty device id.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Id,
    pub user_id: Id,
    pub device_id: Option<String>,
    /// e.g. `"ios"`/`"android"` — carried on every push built from this
    /// session (spec §3 `PushNotification`).
    pub platform: String,
    pub expires_at: DateTime<Utc>,
}

/// Online/away/dnd/offline, keyed by user-id (spec §6.2 `Status.GetOnline`).
#[derive(Debug, Clone, FromRow)]
pub struct Status {
    pub user_id: Id,
    pub status: String,
}

impl Status {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    pub fn is_dnd(&self) -> bool {
        self.status == "dnd"
    }
}
