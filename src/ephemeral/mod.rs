//! Ephemeral, single-user posts (spec §4.F `EphemeralEmitter`).
//!
//! Used by the notification dispatcher for out-of-channel-mention advisories
//! and suppressed-broadcast-token warnings (spec §4.D steps 3/5). Never
//! persisted — the post only ever exists inside the realtime event payload.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::events::{event_type, Event, EventBus};
use crate::models::{Id, Post, PostType};

pub struct EphemeralEmitter {
    events: Arc<dyn EventBus>,
}

impl EphemeralEmitter {
    pub fn new(events: Arc<dyn EventBus>) -> Self {
        EphemeralEmitter { events }
    }

    /// Builds an ephemeral post addressed to `target_user_id` and publishes
    /// it, scoped so only that user receives it. Returns the built post for
    /// callers that want to log or test against it; it is never saved.
    pub async fn emit(&self, target_user_id: Id, channel_id: Id, message: impl Into<String>) -> Post {
        let now = Utc::now();
        let post = Post {
            id: Id::new(),
            user_id: target_user_id,
            channel_id,
            root_id: None,
            parent_id: None,
            create_at: now,
            update_at: now,
            delete_at: 0,
            message: message.into(),
            post_type: PostType::Ephemeral,
            file_ids: json!([]),
            props: json!({}),
            hashtags: String::new(),
        };

        let event = Event::new(event_type::EPHEMERAL_MESSAGE, json!({ "post": post }))
            .for_channel(channel_id)
            .for_user(target_user_id);
        self.events.publish(event).await;

        post
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingBus {
        events: Mutex<Vec<Event>>,
    }

    #[async_trait::async_trait]
    impl EventBus for RecordingBus {
        async fn publish(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn emits_post_scoped_to_single_user() {
        let bus = Arc::new(RecordingBus {
            events: Mutex::new(Vec::new()),
        });
        let emitter = EphemeralEmitter::new(bus.clone());
        let user_id = Id::new();
        let channel_id = Id::new();

        let post = emitter.emit(user_id, channel_id, "only you can see this").await;

        assert_eq!(post.post_type, PostType::Ephemeral);
        assert_eq!(post.user_id, user_id);

        let events = bus.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, Some(user_id));
        assert_eq!(events[0].event_type, event_type::EPHEMERAL_MESSAGE);
    }
}
