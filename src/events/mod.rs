//! The realtime broadcast sink (spec §4.G `EventBus`).
//!
//! A single `publish` operation; delivery is best-effort and fire-and-forget.
//! The websocket layer's `ConnectionManager`-backed implementation lives in
//! `crate::websocket`, mirroring how the teacher's `broadcast_to_server`
//! sits on top of the same registry.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::models::Id;

/// Event type names used by the post core (spec §4.C/§4.D/§4.F).
pub mod event_type {
    pub const POSTED: &str = "posted";
    pub const POST_EDITED: &str = "post_edited";
    pub const POST_DELETED: &str = "post_deleted";
    pub const EPHEMERAL_MESSAGE: &str = "ephemeral_message";
}

/// Carries a type, optional team/channel/user scopes, and a free-form
/// payload (spec §4.G).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Event {
    pub event_type: String,
    pub team_id: Option<Id>,
    pub channel_id: Option<Id>,
    /// Scoping an event to a single user is how [`crate::ephemeral`]
    /// delivers a message nobody else can see.
    pub user_id: Option<Id>,
    pub payload: Json,
}

impl Event {
    pub fn new(event_type: &str, payload: Json) -> Self {
        Event {
            event_type: event_type.to_string(),
            team_id: None,
            channel_id: None,
            user_id: None,
            payload,
        }
    }

    pub fn for_channel(mut self, channel_id: Id) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn for_team(mut self, team_id: Id) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn for_user(mut self, user_id: Id) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// The one operation the dispatcher needs from the realtime layer (spec
/// §4.G). Implementations must never block the caller on delivery —
/// `posts::PostService` and `notifications::NotificationDispatcher` both
/// treat `publish` as fire-and-forget.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event);
}
