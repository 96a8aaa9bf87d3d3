//! Post CRUD and search (spec §4.C `PostService`).

pub mod cache;
pub mod hashtags;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::events::{event_type, Event, EventBus};
use crate::models::{CreatePostRequest, Id, Post, PostList, PostType, UpdatePostRequest};
use crate::notifications::NotificationDispatcher;
use crate::store::{SearchParams, StoreFacade};
use crate::webhooks::WebhookDispatcher;

use cache::ChannelCacheInvalidator;

/// Per-call context a handler builds before invoking [`PostService::create`].
/// `is_system_admin` gates whether a caller-supplied `create_at` is honoured
/// (spec §4.C); `trigger_webhooks` is false for posts created as a webhook
/// callback's response, to prevent dispatch loops (spec §4.E, S5).
pub struct CreatePostContext {
    pub caller_id: Id,
    pub is_system_admin: bool,
    pub trigger_webhooks: bool,
}

impl CreatePostContext {
    pub fn new(caller_id: Id) -> Self {
        CreatePostContext {
            caller_id,
            is_system_admin: false,
            trigger_webhooks: true,
        }
    }
}

pub struct PostService {
    store: Arc<dyn StoreFacade>,
    events: Arc<dyn EventBus>,
    cache: Arc<dyn ChannelCacheInvalidator>,
    notifications: Arc<NotificationDispatcher>,
    webhooks: Arc<WebhookDispatcher>,
}

impl PostService {
    pub fn new(
        store: Arc<dyn StoreFacade>,
        events: Arc<dyn EventBus>,
        cache: Arc<dyn ChannelCacheInvalidator>,
        notifications: Arc<NotificationDispatcher>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        PostService {
            store,
            events,
            cache,
            notifications,
            webhooks,
        }
    }

    async fn require_member(&self, channel_id: Id, user_id: Id) -> AppResult<()> {
        if self.store.is_channel_member(channel_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden("not a member of this channel".into()))
        }
    }

    /// Validates parent/root integrity and persists a new post, then hands
    /// off to the notification and (optionally) webhook dispatchers
    /// asynchronously. Returns as soon as persistence succeeds — dispatch
    /// failures never surface here (spec §7).
    pub async fn create(&self, ctx: &CreatePostContext, req: CreatePostRequest) -> AppResult<Post> {
        let channel = self.store.get_channel(req.channel_id).await?;
        if channel.is_deleted() {
            return Err(AppError::Forbidden("channel is deleted".into()));
        }
        self.require_member(channel.id, ctx.caller_id).await?;

        match (req.root_id, req.parent_id) {
            (None, Some(_)) => {
                return Err(AppError::InvalidParam("parent_id requires root_id".into()));
            }
            (Some(root_id), parent_id) => {
                let root = self
                    .store
                    .get_post(root_id)
                    .await
                    .map_err(|_| AppError::InvalidParam("root post not found".into()))?;
                if root.channel_id != channel.id {
                    return Err(AppError::InvalidParam(
                        "root post belongs to a different channel".into(),
                    ));
                }
                if let Some(parent_id) = parent_id {
                    if parent_id != root_id {
                        let parent = self
                            .store
                            .get_post(parent_id)
                            .await
                            .map_err(|_| AppError::InvalidParam("parent post not found".into()))?;
                        if parent.id != root_id && parent.root_id != Some(root_id) {
                            return Err(AppError::InvalidParam(
                                "parent post is not part of this thread".into(),
                            ));
                        }
                    }
                }
            }
            (None, None) => {}
        }

        let create_at = match (req.create_at, ctx.is_system_admin) {
            (Some(t), true) => t,
            _ => Utc::now(),
        };

        let mut unique_file_ids = Vec::new();
        let mut seen = HashSet::new();
        for file_id in &req.file_ids {
            if seen.insert(*file_id) {
                unique_file_ids.push(*file_id);
            }
        }

        let post = Post {
            id: Id::new(),
            user_id: ctx.caller_id,
            channel_id: channel.id,
            root_id: req.root_id,
            parent_id: req.parent_id,
            create_at,
            update_at: create_at,
            delete_at: 0,
            message: req.message.clone(),
            post_type: PostType::User,
            file_ids: json!(unique_file_ids.iter().map(Id::to_string).collect::<Vec<_>>()),
            props: if req.props.is_null() {
                json!({})
            } else {
                req.props.clone()
            },
            hashtags: hashtags::parse_hashtags(&req.message),
        };

        let saved = self.store.save_post(&post).await?;

        for file_id in unique_file_ids {
            self.store.attach_file_to_post(file_id, saved.id).await?;
        }

        self.cache.invalidate_channel_posts(channel.id).await;

        let team = self.store.get_team(channel.team_id).await?;

        let notifications = self.notifications.clone();
        let dispatch_post = saved.clone();
        let dispatch_channel = channel.clone();
        let dispatch_team = team.clone();
        tokio::spawn(async move {
            notifications
                .dispatch(&dispatch_post, &dispatch_team, &dispatch_channel)
                .await;
        });

        if ctx.trigger_webhooks {
            let webhooks = self.webhooks.clone();
            let webhook_post = saved.clone();
            let webhook_channel = channel.clone();
            tokio::spawn(async move {
                webhooks.dispatch(&webhook_post, &webhook_channel).await;
            });
        }

        Ok(saved)
    }

    /// Only `message`/derived `hashtags` are replaced; everything else
    /// carries over from the stored copy (spec §4.C `Update`).
    pub async fn update(&self, caller_id: Id, req: UpdatePostRequest) -> AppResult<Post> {
        let existing = self.store.get_post(req.id).await?;
        if existing.is_deleted() || existing.is_system() {
            return Err(AppError::Forbidden("post cannot be edited".into()));
        }
        if existing.user_id != caller_id {
            return Err(AppError::Forbidden(
                "only the author can edit this post".into(),
            ));
        }

        let mut updated = existing;
        updated.hashtags = hashtags::parse_hashtags(&req.message);
        updated.message = req.message;
        updated.update_at = Utc::now();

        let saved = self.store.update_post(&updated).await?;
        self.cache.invalidate_channel_posts(saved.channel_id).await;

        let event = Event::new(event_type::POST_EDITED, json!({ "post": saved }))
            .for_channel(saved.channel_id);
        self.events.publish(event).await;

        Ok(saved)
    }

    /// Soft-deletes the post; cache invalidation, the flagged-preference
    /// cleanup, and the `post_deleted` event all run asynchronously after
    /// the delete itself commits (spec §4.C `Delete`).
    pub async fn delete(&self, caller_id: Id, post_id: Id, channel_id: Id) -> AppResult<()> {
        let post = self.store.get_post(post_id).await?;
        if post.channel_id != channel_id {
            return Err(AppError::InvalidParam(
                "post does not belong to this channel".into(),
            ));
        }

        let channel = self.store.get_channel(channel_id).await?;
        let team = self.store.get_team(channel.team_id).await?;
        let can_delete = post.user_id == caller_id || team.owner_id == caller_id;
        if !can_delete {
            return Err(AppError::Forbidden(
                "cannot delete another user's post".into(),
            ));
        }

        let now = Utc::now();
        self.store.delete_post(post_id, now).await?;

        let store = self.store.clone();
        let events = self.events.clone();
        let cache = self.cache.clone();
        let legacy_only = post.file_id_list().is_empty();
        tokio::spawn(async move {
            // Legacy-filename posts never got FileInfo rows; posts with
            // file_ids keep theirs for audit even after the post is gone
            // (spec §9 "Legacy filename cascade" — do not "fix" this).
            if legacy_only {
                if let Err(e) = store.delete_file_infos_for_post(post_id).await {
                    tracing::warn!(error = ?e, post_id = %post_id, "file_info cleanup failed after post delete");
                }
            }
            if let Err(e) = store.delete_flagged_preferences_for_post(post_id).await {
                tracing::warn!(error = ?e, post_id = %post_id, "flagged-preference cleanup failed after post delete");
            }
            cache.invalidate_channel_posts(channel_id).await;

            let event = Event::new(
                event_type::POST_DELETED,
                json!({ "post_id": post_id, "channel_id": channel_id }),
            )
            .for_channel(channel_id);
            events.publish(event).await;
        });

        Ok(())
    }

    pub async fn get(&self, caller_id: Id, channel_id: Id, offset: i64, limit: i64) -> AppResult<PostList> {
        self.require_member(channel_id, caller_id).await?;
        self.store.get_posts(channel_id, offset, limit).await
    }

    pub async fn get_since(&self, caller_id: Id, channel_id: Id, since_ms: i64) -> AppResult<PostList> {
        self.require_member(channel_id, caller_id).await?;
        self.store.get_posts_since(channel_id, since_ms).await
    }

    pub async fn get_before(
        &self,
        caller_id: Id,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList> {
        self.require_member(channel_id, caller_id).await?;
        self.store
            .get_posts_before(channel_id, post_id, offset, limit)
            .await
    }

    pub async fn get_after(
        &self,
        caller_id: Id,
        channel_id: Id,
        post_id: Id,
        offset: i64,
        limit: i64,
    ) -> AppResult<PostList> {
        self.require_member(channel_id, caller_id).await?;
        self.store
            .get_posts_after(channel_id, post_id, offset, limit)
            .await
    }

    /// Additionally refuses if the returned post's channel differs from the
    /// requested channel (spec §4.C `GetById`).
    pub async fn get_by_id(&self, caller_id: Id, channel_id: Id, post_id: Id) -> AppResult<Post> {
        self.require_member(channel_id, caller_id).await?;
        let post = self.store.get_post(post_id).await?;
        if post.channel_id != channel_id {
            return Err(AppError::NotFound("post not found in this channel".into()));
        }
        Ok(post)
    }

    /// `/teams/{t}/posts/{id}` (spec §6.1): the caller knows only the team
    /// and the post id, not its channel, so membership is checked against
    /// the post's own channel after the fetch rather than up front. Unlike
    /// [`Self::get_permalink`], a caller who isn't already a channel member
    /// is refused rather than auto-joined.
    pub async fn get_by_id_in_team(&self, caller_id: Id, team_id: Id, post_id: Id) -> AppResult<Post> {
        let post = self.store.get_post(post_id).await?;
        let channel = self.store.get_channel(post.channel_id).await?;
        if channel.team_id != team_id {
            return Err(AppError::NotFound("post not found in this team".into()));
        }
        self.require_member(channel.id, caller_id).await?;
        Ok(post)
    }

    /// `/teams/{t}/pltmp/{id}` permalink lookup (spec §6.1, S6): a caller who
    /// is a team member but not yet a channel member is auto-joined rather
    /// than refused, matching the "open the permalink" UX the endpoint
    /// exists for.
    pub async fn get_permalink(&self, caller_id: Id, team_id: Id, post_id: Id) -> AppResult<Post> {
        let post = self.store.get_post(post_id).await?;
        let channel = self.store.get_channel(post.channel_id).await?;
        if channel.team_id != team_id {
            return Err(AppError::NotFound("post not found in this team".into()));
        }
        if !self.store.is_channel_member(channel.id, caller_id).await? {
            if !self.store.is_team_member(team_id, caller_id).await? {
                return Err(AppError::Forbidden("not a member of this team".into()));
            }
            self.store.join_channel(channel.id, caller_id).await?;
        }
        Ok(post)
    }

    pub async fn get_flagged(&self, caller_id: Id, offset: i64, limit: i64) -> AppResult<PostList> {
        self.store.get_flagged_posts(caller_id, offset, limit).await
    }

    /// Checked before reading the underlying list, so callers can answer a
    /// conditional GET with 304 without ever touching `get`/`get_since`
    /// (spec §4.C).
    pub async fn etag(&self, caller_id: Id, channel_id: Id) -> AppResult<String> {
        self.require_member(channel_id, caller_id).await?;
        self.store.get_etag_for_channel(channel_id).await
    }

    /// Rejects a query whose only term group is the bare wildcard `*`
    /// (spec §4.C); otherwise fans each group out to the store and
    /// concatenates the (already de-duplicated-by-id) results.
    pub async fn search(
        &self,
        caller_id: Id,
        team_id: Id,
        groups: Vec<SearchParams>,
    ) -> AppResult<PostList> {
        if groups.len() == 1 && groups[0].terms.trim() == "*" {
            return Err(AppError::InvalidParam(
                "search query cannot be only '*'".into(),
            ));
        }
        self.store.search_posts(team_id, caller_id, &groups).await
    }
}
