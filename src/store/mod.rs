//! Store contract (spec §6.2) — an abstraction over async data operations so
//! `posts`, `notifications` and `webhooks` never see `sqlx` directly.

pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::AppResult;
use crate::models::{
    Channel, FileInfo, Id, OutgoingWebhook, Post, PostList, Preference, Profile, Session, Status,
    Team,
};

/// One parsed search-param group (spec §4.C `Search`) — e.g. `in:general
/// from:alice "release notes"`. A query whose only term is `*` is rejected
/// by `PostService::search` before it ever reaches the store.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub terms: String,
    pub is_or: bool,
    pub in_channel: Option<Id>,
    pub from_user: Option<Id>,
    pub on_date: Option<NaiveDate>,
}

/// Mirrors every bullet in spec §6.2; each method is the Rust rendering of
/// "a future carrying either data or an error."
#[async_trait]
pub trait StoreFacade: Send + Sync {
    // -- Channel --------------------------------------------------------
    async fn get_channel(&self, id: Id) -> AppResult<Channel>;
    async fn get_channel_members(&self, channel_id: Id) -> AppResult<Vec<Profile>>;
    async fn is_channel_member(&self, channel_id: Id, user_id: Id) -> AppResult<bool>;
    /// Adds `user_id` to `channel_id` if not already a member (spec §6.1
    /// permalink auto-join, S6). Idempotent.
    async fn join_channel(&self, channel_id: Id, user_id: Id) -> AppResult<()>;
    async fn update_last_viewed_at(&self, channel_id: Id, user_id: Id) -> AppResult<()>;
    async fn increment_mention_count(&self, channel_id: Id, user_id: Id) -> AppResult<()>;

    // -- Post -------------------------------------------------------------
    async fn get_post(&self, id: Id) -> AppResult<Post>;
    async fn save_post(&self, post: &Post) -> AppResult<Post>;
    async fn update_post(&self, post: &Post) -> AppResult<Post>;
    async fn delete_post(&self, id: Id, delete_at: DateTime<Utc>) -> AppResult<()>;
    async fn get_posts(&self, channel_id: Id, offset: i64, limit: i64) -> AppResult<PostList>;
    async fn get_posts_since(&self, channel_id: Id, since_ms: i64) -> AppResult<PostList>;
    async fn get_posts_before(
        &self,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList>;
    async fn get_posts_after(
        &self,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList>;
    async fn get_flagged_posts(&self, user_id: Id, offset: i64, limit: i64) -> AppResult<PostList>;
    /// Every live post in the thread rooted at `root_id`, including the root
    /// itself (spec §4.D step 3 thread-subscriber computation).
    async fn get_thread_posts(&self, root_id: Id) -> AppResult<PostList>;
    async fn get_etag_for_channel(&self, channel_id: Id) -> AppResult<String>;
    async fn search_posts(
        &self,
        team_id: Id,
        user_id: Id,
        groups: &[SearchParams],
    ) -> AppResult<PostList>;

    // -- User ---------------------------------------------------------
    async fn get_user(&self, id: Id) -> AppResult<Profile>;
    async fn get_profiles_in_channel(&self, channel_id: Id) -> AppResult<Vec<Profile>>;
    async fn get_profiles_by_usernames(
        &self,
        team_id: Id,
        usernames: &[String],
    ) -> AppResult<Vec<Profile>>;
    async fn get_unread_count(&self, channel_id: Id, user_id: Id) -> AppResult<i64>;

    // -- Team ---------------------------------------------------------
    async fn get_team(&self, id: Id) -> AppResult<Team>;
    async fn get_teams_by_user_id(&self, user_id: Id) -> AppResult<Vec<Team>>;
    async fn is_team_member(&self, team_id: Id, user_id: Id) -> AppResult<bool>;

    // -- Preference -----------------------------------------------------
    async fn get_preference(
        &self,
        user_id: Id,
        category: &str,
        name: &str,
    ) -> AppResult<Option<Preference>>;
    async fn save_preference(&self, pref: &Preference) -> AppResult<()>;
    async fn delete_preference(&self, user_id: Id, category: &str, name: &str) -> AppResult<()>;
    /// Removes every flagged-post preference (across all users) that
    /// references `post_id` — used when a post is deleted (spec §4.C
    /// `Delete`).
    async fn delete_flagged_preferences_for_post(&self, post_id: Id) -> AppResult<()>;

    // -- Session --------------------------------------------------------
    async fn get_sessions_with_active_device_ids(&self, user_id: Id) -> AppResult<Vec<Session>>;

    // -- Status ---------------------------------------------------------
    async fn get_online(&self, user_ids: &[Id]) -> AppResult<Vec<Status>>;

    // -- Webhook --------------------------------------------------------
    async fn get_outgoing_webhooks_by_team(&self, team_id: Id) -> AppResult<Vec<OutgoingWebhook>>;

    // -- FileInfo -------------------------------------------------------
    async fn get_file_infos_for_post(&self, post_id: Id) -> AppResult<Vec<FileInfo>>;
    async fn attach_file_to_post(&self, file_id: Id, post_id: Id) -> AppResult<()>;
    async fn delete_file_infos_for_post(&self, post_id: Id) -> AppResult<()>;
}
