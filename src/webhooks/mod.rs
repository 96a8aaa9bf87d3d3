//! Outgoing webhook matching and dispatch (spec §4.E `WebhookDispatcher`).

pub mod markdown;

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as Json};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{
    prop_keys, Channel, ChannelType, ContentType, Id, OutgoingWebhook, OutgoingWebhookPayload,
    OutgoingWebhookResponse, Post, PostType, Team, TriggerWhen,
};
use crate::notifications::NotificationDispatcher;
use crate::posts::cache::ChannelCacheInvalidator;
use crate::posts::hashtags;
use crate::store::StoreFacade;

pub struct WebhookDispatcher {
    store: Arc<dyn StoreFacade>,
    cache: Arc<dyn ChannelCacheInvalidator>,
    notifications: Arc<NotificationDispatcher>,
    client: reqwest::Client,
    config: Arc<Config>,
}

impl WebhookDispatcher {
    pub fn new(
        store: Arc<dyn StoreFacade>,
        cache: Arc<dyn ChannelCacheInvalidator>,
        notifications: Arc<NotificationDispatcher>,
        client: reqwest::Client,
        config: Arc<Config>,
    ) -> Self {
        WebhookDispatcher {
            store,
            cache,
            notifications,
            client,
            config,
        }
    }

    /// Entry point `posts::PostService::create` spawns when `trigger_webhooks`
    /// is true. Failures are logged here, never surfaced (spec §7).
    pub async fn dispatch(&self, post: &Post, channel: &Channel) {
        if let Err(e) = self.dispatch_inner(post, channel).await {
            tracing::warn!(error = ?e, post_id = %post.id, "webhook dispatch failed");
        }
    }

    async fn dispatch_inner(&self, post: &Post, channel: &Channel) -> AppResult<()> {
        if !self.config.enable_outgoing_webhooks || channel.r#type != ChannelType::Open {
            return Ok(());
        }

        let team = self.store.get_team(channel.team_id).await?;
        let hooks = self.store.get_outgoing_webhooks_by_team(team.id).await?;
        let first_word = post.message.split_whitespace().next().unwrap_or("");
        let author = self.store.get_user(post.user_id).await?;

        for hook in hooks.iter().filter(|h| !h.is_deleted() && matches(h, channel.id, first_word)) {
            let trigger_word = hook
                .trigger_word_list()
                .into_iter()
                .find(|t| match hook.trigger_when {
                    TriggerWhen::Full => *t == first_word,
                    TriggerWhen::Startswith => first_word.starts_with(t),
                })
                .unwrap_or("")
                .to_string();

            let payload = OutgoingWebhookPayload {
                token: hook.token.clone(),
                team_id: team.id,
                team_domain: team.name.clone(),
                channel_id: channel.id,
                channel_name: channel.name.clone(),
                timestamp: post.create_at.timestamp_millis(),
                user_id: post.user_id,
                user_name: author.username.clone(),
                post_id: post.id,
                text: post.message.clone(),
                trigger_word,
            };

            let responses = futures::future::join_all(
                hook.callback_urls
                    .iter()
                    .map(|url| self.post_to_callback(url, hook.content_type, &payload)),
            )
            .await;

            for response in responses.into_iter().flatten() {
                self.create_webhook_post(channel, &team, hook, response).await;
            }
        }

        Ok(())
    }

    /// POSTs `payload` to one callback URL, JSON- or form-encoded per the
    /// hook's `content_type` (spec §6.4). A non-2xx response or an
    /// unparseable body is dropped silently — the caller never sees it.
    async fn post_to_callback(
        &self,
        url: &str,
        content_type: ContentType,
        payload: &OutgoingWebhookPayload,
    ) -> Option<OutgoingWebhookResponse> {
        let request = match content_type {
            ContentType::Json => self.client.post(url).json(payload),
            ContentType::FormUrlencoded => {
                let body = serde_urlencoded::to_string(payload).ok()?;
                self.client
                    .post(url)
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(body)
            }
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, %url, "outgoing webhook callback failed");
                return None;
            }
        };
        if !response.status().is_success() {
            return None;
        }
        response.json::<OutgoingWebhookResponse>().await.ok()
    }

    /// `CreateWebhookPost` (spec §4.E): rewrites markdown links, applies the
    /// username/icon override toggles, persists the post as
    /// `PostType::WebhookGenerated`, then hands off to the notification
    /// dispatcher only — never back through `self`, so a webhook response
    /// can never re-trigger outgoing webhooks.
    async fn create_webhook_post(
        &self,
        channel: &Channel,
        team: &Team,
        hook: &OutgoingWebhook,
        response: OutgoingWebhookResponse,
    ) {
        let Some(text) = response.text.filter(|t| !t.is_empty()) else {
            return;
        };
        let rewritten_text = markdown::rewrite_links(&text);

        let mut props = json!({ prop_keys::FROM_WEBHOOK: true });
        if let Some(map) = props.as_object_mut() {
            if self.config.enable_post_username_override {
                if let Some(username) = &response.username {
                    map.insert(prop_keys::OVERRIDE_USERNAME.to_string(), json!(username));
                }
            }
            if self.config.enable_post_icon_override {
                if let Some(icon) = &response.icon_url {
                    map.insert(prop_keys::OVERRIDE_ICON_URL.to_string(), json!(icon));
                }
            }
            let attachments = rewrite_attachments(&response.attachments);
            if !attachments.is_null() {
                map.insert(prop_keys::ATTACHMENTS.to_string(), attachments);
            }
            if let Some(extra) = response.props.as_object() {
                let reserved = [
                    prop_keys::FROM_WEBHOOK,
                    prop_keys::OVERRIDE_USERNAME,
                    prop_keys::OVERRIDE_ICON_URL,
                    prop_keys::ATTACHMENTS,
                ];
                for (key, value) in extra {
                    if !reserved.contains(&key.as_str()) {
                        map.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        let now = Utc::now();
        let post = Post {
            id: Id::new(),
            user_id: hook.creator_id,
            channel_id: channel.id,
            root_id: None,
            parent_id: None,
            create_at: now,
            update_at: now,
            delete_at: 0,
            message: rewritten_text.clone(),
            post_type: PostType::WebhookGenerated,
            file_ids: json!([]),
            props,
            hashtags: hashtags::parse_hashtags(&rewritten_text),
        };

        match self.store.save_post(&post).await {
            Ok(saved) => {
                self.cache.invalidate_channel_posts(channel.id).await;
                let notifications = self.notifications.clone();
                let dispatch_post = saved;
                let dispatch_channel = channel.clone();
                let dispatch_team = team.clone();
                tokio::spawn(async move {
                    notifications
                        .dispatch(&dispatch_post, &dispatch_team, &dispatch_channel)
                        .await;
                });
            }
            Err(e) => {
                tracing::warn!(error = ?e, "failed to persist webhook-generated post");
            }
        }
    }
}

/// Spec §4.E match rule: channel scope (if any) must equal the post's
/// channel. An empty trigger-word list only matches on scope alone when the
/// hook is scoped to this exact channel — an unscoped hook (`channel_id:
/// None`) with no trigger words never matches anything, it only ever fires
/// via an explicit trigger word.
fn matches(hook: &OutgoingWebhook, channel_id: Id, first_word: &str) -> bool {
    if !hook.channel_id.map_or(true, |scope| scope == channel_id) {
        return false;
    }
    let triggers = hook.trigger_word_list();
    if triggers.is_empty() {
        return hook.channel_id == Some(channel_id);
    }
    match hook.trigger_when {
        TriggerWhen::Full => triggers.iter().any(|t| *t == first_word),
        TriggerWhen::Startswith => triggers.iter().any(|t| first_word.starts_with(t)),
    }
}

/// Applies [`markdown::rewrite_links`] to `attachments[].text`, `.pretext`,
/// and `.fields[].value` (spec §4.E `CreateWebhookPost`).
fn rewrite_attachments(attachments: &Json) -> Json {
    let Some(array) = attachments.as_array() else {
        return attachments.clone();
    };
    Json::Array(array.iter().map(rewrite_attachment).collect())
}

fn rewrite_attachment(attachment: &Json) -> Json {
    let mut rewritten = attachment.clone();
    let Some(map) = rewritten.as_object_mut() else {
        return rewritten;
    };

    for key in ["text", "pretext"] {
        if let Some(value) = map.get(key).and_then(Json::as_str) {
            let rewritten_value = markdown::rewrite_links(value);
            map.insert(key.to_string(), json!(rewritten_value));
        }
    }

    if let Some(fields) = map.get("fields").and_then(Json::as_array).cloned() {
        let rewritten_fields: Vec<Json> = fields
            .iter()
            .map(|field| {
                let mut field = field.clone();
                if let Some(field_map) = field.as_object_mut() {
                    if let Some(value) = field_map.get("value").and_then(Json::as_str) {
                        field_map.insert("value".to_string(), json!(markdown::rewrite_links(value)));
                    }
                }
                field
            })
            .collect();
        map.insert("fields".to_string(), json!(rewritten_fields));
    }

    rewritten
}
