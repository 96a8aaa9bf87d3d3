use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    FormUrlencoded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TriggerWhen {
    Full,
    Startswith,
}

/// Spec §3 `OutgoingWebhook`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutgoingWebhook {
    pub id: Id,
    pub creator_id: Id,
    pub team_id: Id,
    /// An empty scope only matches posts by an explicit trigger word, never
    /// by scope alone — see `webhooks::matches`.
    pub channel_id: Option<Id>,
    pub content_type: ContentType,
    /// Comma-separated on the row; split into words at match time.
    pub trigger_words: String,
    pub trigger_when: TriggerWhen,
    pub callback_urls: Vec<String>,
    pub token: String,
    pub create_at: DateTime<Utc>,
    pub delete_at: i64,
}

impl OutgoingWebhook {
    pub fn trigger_word_list(&self) -> Vec<&str> {
        self.trigger_words
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }
}

/// Spec §6.4 — the payload POSTed to each callback URL.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingWebhookPayload {
    pub token: String,
    pub team_id: Id,
    pub team_domain: String,
    pub channel_id: Id,
    pub channel_name: String,
    pub timestamp: i64,
    pub user_id: Id,
    pub user_name: String,
    pub post_id: Id,
    pub text: String,
    pub trigger_word: String,
}

/// Spec §6.4 — the expected shape of a webhook callback's 2xx JSON response.
/// Unknown/missing fields are simply absent; a non-2xx or unparseable body
/// is dropped entirely by the caller, never reaching this type.
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingWebhookResponse {
    pub text: Option<String>,
    pub username: Option<String>,
    pub icon_url: Option<String>,
    #[serde(default)]
    pub attachments: serde_json::Value,
    #[serde(default)]
    pub props: serde_json::Value,
}
