use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::FromRow;

use super::Id;

/// Reserved keys in `Post.props` — callers may set any other key, but these
/// four are read and written by the core itself.
pub mod prop_keys {
    pub const FROM_WEBHOOK: &str = "from_webhook";
    pub const OVERRIDE_USERNAME: &str = "override_username";
    pub const OVERRIDE_ICON_URL: &str = "override_icon_url";
    pub const ATTACHMENTS: &str = "attachments";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    User,
    System,
    Ephemeral,
    WebhookGenerated,
}

impl Default for PostType {
    fn default() -> Self {
        PostType::User
    }
}

/// The durable unit (spec §3 `Post`).
///
/// `delete_at == 0` means live; a non-zero value is the soft-delete
/// timestamp. `props` is the reserved-key bag described in
/// [`prop_keys`]; `hashtags` is derived from `message`, never client-supplied.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: Id,
    pub user_id: Id,
    pub channel_id: Id,
    pub root_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub create_at: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
    /// 0 means live; non-zero is the soft-delete timestamp.
    pub delete_at: i64,
    pub message: String,
    pub post_type: PostType,
    pub file_ids: Json,
    pub props: Json,
    pub hashtags: String,
}

impl Post {
    pub fn is_deleted(&self) -> bool {
        self.delete_at != 0
    }

    pub fn is_system(&self) -> bool {
        matches!(self.post_type, PostType::System)
    }

    pub fn from_webhook(&self) -> bool {
        self.props
            .get(prop_keys::FROM_WEBHOOK)
            .and_then(Json::as_bool)
            .unwrap_or(false)
    }

    pub fn override_username(&self) -> Option<&str> {
        self.props
            .get(prop_keys::OVERRIDE_USERNAME)
            .and_then(Json::as_str)
    }

    pub fn file_id_list(&self) -> Vec<Id> {
        self.file_ids
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(Json::as_str)
                    .filter_map(|s| s.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Caller-supplied shape for `PostService::create`/`update`. `id` and
/// `create_at` are only honoured for admin callers (see `CreatePostContext`);
/// everything else is assigned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub channel_id: Id,
    pub root_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub message: String,
    #[serde(default)]
    pub file_ids: Vec<Id>,
    #[serde(default)]
    pub props: Json,
    /// Only honoured when the caller has system-admin capability (spec §4.C).
    pub create_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePostRequest {
    pub id: Id,
    pub message: String,
}

/// An ordered bundle of posts plus an id→Post map (spec §3 `PostList`).
#[derive(Debug, Clone, Serialize)]
pub struct PostList {
    pub order: Vec<Id>,
    pub posts: HashMap<Id, Post>,
}

impl PostList {
    pub fn new() -> Self {
        PostList {
            order: Vec::new(),
            posts: HashMap::new(),
        }
    }

    pub fn push(&mut self, post: Post) {
        if !self.posts.contains_key(&post.id) {
            self.order.push(post.id);
        }
        self.posts.insert(post.id, post);
    }

    pub fn extend(&mut self, other: PostList) {
        for id in other.order {
            if let Some(post) = other.posts.get(&id) {
                self.push(post.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Derived from channel-id and the most recent `update_at` in the list
    /// (spec §3, §6.1 conditional-GET support).
    pub fn etag(&self, channel_id: Id) -> String {
        let latest = self
            .posts
            .values()
            .map(|p| p.update_at)
            .max()
            .map(|t| t.timestamp_millis())
            .unwrap_or(0);
        format!("{channel_id}.{latest}")
    }
}

impl Default for PostList {
    fn default() -> Self {
        Self::new()
    }
}
