pub mod connection_manager;
pub mod events;
pub mod handler;

pub use connection_manager::ConnectionManager;
pub use handler::websocket_handler;

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{Event, EventBus};
use crate::store::StoreFacade;
use events::GatewayMessage;

/// The realtime sink behind `crate::events::EventBus`, built the same way
/// the teacher's own `broadcast_to_server` sits on top of
/// [`ConnectionManager`] — resolve the event's scope to a set of user ids,
/// then hand the serialized frame to `broadcast_to_users`/`send_to_user`.
///
/// `NotificationDispatcher`/`PostService` only ever publish channel-scoped
/// or user-scoped events (never team-scoped), so this is the full set of
/// scopes this bus needs to resolve.
pub struct GatewayEventBus {
    connections: ConnectionManager,
    store: Arc<dyn StoreFacade>,
}

impl GatewayEventBus {
    pub fn new(connections: ConnectionManager, store: Arc<dyn StoreFacade>) -> Self {
        GatewayEventBus { connections, store }
    }
}

#[async_trait]
impl EventBus for GatewayEventBus {
    async fn publish(&self, event: Event) {
        let frame = GatewayMessage::dispatch(&event.event_type, event.payload.clone());
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(event_type = %event.event_type, error = ?e, "failed to serialize gateway event");
                return;
            }
        };

        if let Some(user_id) = event.user_id {
            self.connections.send_to_user(user_id, &json).await;
            return;
        }

        if let Some(channel_id) = event.channel_id {
            let member_ids: Vec<_> = match self.store.get_channel_members(channel_id).await {
                Ok(members) => members.into_iter().map(|m| m.id).collect(),
                Err(e) => {
                    tracing::warn!(channel_id = %channel_id, error = ?e, "failed to resolve channel members for event broadcast");
                    return;
                }
            };
            self.connections.broadcast_to_users(&member_ids, &json).await;
        }
    }
}
