use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::events::EventBus;
use crate::notifications::NotificationDispatcher;
use crate::posts::cache::ChannelCacheInvalidator;
use crate::posts::PostService;
use crate::store::StoreFacade;
use crate::webhooks::WebhookDispatcher;
use crate::websocket::ConnectionManager;

/// Shared application state passed to all handlers and extractors.
///
/// `ConnectionManager` is cheaply cloneable (it wraps an `Arc` internally),
/// so cloning `AppState` for each request is inexpensive; every other
/// collaborator is already behind an `Arc`, so this whole struct is a
/// handful of pointer copies.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub connections: ConnectionManager,
    pub store: Arc<dyn StoreFacade>,
    pub events: Arc<dyn EventBus>,
    pub cache: Arc<dyn ChannelCacheInvalidator>,
    pub posts: Arc<PostService>,
    pub notifications: Arc<NotificationDispatcher>,
    pub webhooks: Arc<WebhookDispatcher>,
    pub http_client: Client,
}
