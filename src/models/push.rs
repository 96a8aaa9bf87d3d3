use serde::Serialize;

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushType {
    Message,
    Clear,
}

/// Spec §3/§6.3 `PushNotification` — the wire body POSTed to the push proxy.
/// `device_id`/`platform` are filled in per active session right before the
/// request goes out (SPEC_FULL §3), so one struct is built per session, not
/// per recipient.
#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    #[serde(rename = "type")]
    pub kind: PushType,
    pub badge: i64,
    pub team_id: Id,
    pub channel_id: Id,
    pub channel_name: String,
    /// `"dm"` for direct-channel messages, empty otherwise (SPEC_FULL §3).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    pub message: String,
    pub device_id: String,
    pub platform: String,
    pub server_id: String,
}
