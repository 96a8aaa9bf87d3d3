//! Durable and wire types for the post core (spec §3).
//!
//! Follows the same three-way split the teacher codebase uses for its own
//! models: a `sqlx::FromRow` row type, a `CreateXRequest`/`UpdateXRequest`
//! pair for handler input, and a DTO only where the wire shape differs from
//! the row shape.

mod channel;
mod file_info;
mod id;
mod post;
mod preference;
mod push;
mod team;
mod user;
mod webhook;

pub use channel::{Channel, ChannelType};
pub use file_info::FileInfo;
pub use id::Id;
pub use post::{prop_keys, CreatePostRequest, Post, PostList, PostType, UpdatePostRequest};
pub use preference::{
    category as preference_category, email_interval_value as preference_email_interval_value,
    name as preference_name, Preference,
};
pub use push::{PushNotification, PushType};
pub use team::Team;
pub use user::{CommentsSetting, NotifyProps, Profile, PushSetting, Session, Status};
pub use webhook::{
    ContentType, OutgoingWebhook, OutgoingWebhookPayload, OutgoingWebhookResponse, TriggerWhen,
};
