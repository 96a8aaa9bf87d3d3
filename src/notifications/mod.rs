//! Recipient computation and multi-channel fan-out for a persisted post
//! (spec §4.D `NotificationDispatcher`).

pub mod email;
pub mod i18n;
pub mod push;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;

use crate::config::{Config, PushContentSetting};
use crate::error::AppResult;
use crate::ephemeral::EphemeralEmitter;
use crate::events::{event_type, Event, EventBus};
use crate::mention::{self, KeywordIndex};
use crate::models::{
    preference_category, preference_email_interval_value, preference_name, Channel, ChannelType,
    FileInfo, Id, Post, Profile, PushNotification, PushSetting, PushType, Status, Team,
};
use crate::store::StoreFacade;

use email::EmailSender;
use i18n::Translator;
use push::PushProxyClient;

pub struct NotificationDispatcher {
    store: Arc<dyn StoreFacade>,
    events: Arc<dyn EventBus>,
    email: Arc<dyn EmailSender>,
    push: Arc<dyn PushProxyClient>,
    translator: Arc<dyn Translator>,
    config: Arc<Config>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn StoreFacade>,
        events: Arc<dyn EventBus>,
        email: Arc<dyn EmailSender>,
        push: Arc<dyn PushProxyClient>,
        translator: Arc<dyn Translator>,
        config: Arc<Config>,
    ) -> Self {
        NotificationDispatcher {
            store,
            events,
            email,
            push,
            translator,
            config,
        }
    }

    /// Entry point `posts::PostService::create` spawns for every new post.
    /// Every internal failure is logged here and never reaches the caller
    /// (spec §7 "dispatchers never fail the foreground call").
    pub async fn dispatch(&self, post: &Post, team: &Team, channel: &Channel) {
        if let Err(e) = self.dispatch_inner(post, team, channel).await {
            tracing::warn!(error = ?e, post_id = %post.id, "notification dispatch failed");
        }
    }

    async fn dispatch_inner(&self, post: &Post, team: &Team, channel: &Channel) -> AppResult<()> {
        // Step 1 — channel profile map.
        let profiles = self.store.get_profiles_in_channel(channel.id).await?;
        let profile_map: HashMap<Id, &Profile> = profiles.iter().map(|p| (p.id, p)).collect();

        // Step 2 — author must be a member.
        let Some(author) = profile_map.get(&post.user_id).copied() else {
            return Ok(());
        };

        let from_webhook = post.from_webhook();
        let mut recipients: HashSet<Id> = HashSet::new();
        let mut potential_others: Vec<String> = Vec::new();
        let mut here = false;
        let mut channel_flag = false;
        let mut all_flag = false;

        // Step 3 — recipients and broadcast flags.
        if channel.r#type == ChannelType::Direct {
            if let Some((a, b)) = channel.direct_member_ids() {
                let other = if a == post.user_id { b } else { a };
                recipients.insert(other);
                if from_webhook {
                    recipients.insert(post.user_id);
                }
            }
        } else {
            let index = KeywordIndex::build(&profiles, self.config.max_notifications_per_channel);
            let mention = mention::parse(&post.message, &index);
            recipients.extend(mention.mentioned.iter().copied());
            potential_others = mention.potential_others;
            here = mention.here;
            channel_flag = mention.channel;
            all_flag = mention.all;

            if let Some(root_id) = post.root_id {
                let thread = self.store.get_thread_posts(root_id).await?;
                for other_post in thread.posts.values() {
                    if other_post.id == post.id {
                        continue;
                    }
                    let Some(commenter) = profile_map.get(&other_post.user_id) else {
                        continue;
                    };
                    let is_root_author = other_post.id == root_id;
                    match commenter.notify().comments() {
                        crate::models::CommentsSetting::Any => {
                            recipients.insert(other_post.user_id);
                        }
                        crate::models::CommentsSetting::Root if is_root_author => {
                            recipients.insert(other_post.user_id);
                        }
                        _ => {}
                    }
                }
            }

            if !from_webhook {
                recipients.remove(&post.user_id);
            }
        }

        if !potential_others.is_empty() {
            let _found = self
                .store
                .get_profiles_by_usernames(team.id, &potential_others)
                .await?;
            self.advise_potential_others(post, channel, &potential_others).await;
        }

        // Step 4 — await mention-count increments before any push is sent.
        let increments = recipients.iter().copied().map(|uid| {
            let store = self.store.clone();
            let channel_id = channel.id;
            async move {
                if let Err(e) = store.increment_mention_count(channel_id, uid).await {
                    tracing::warn!(error = ?e, user_id = %uid, "mention-count increment failed");
                }
            }
        });
        futures::future::join_all(increments).await;

        let profile_ids: Vec<Id> = profiles.iter().map(|p| p.id).collect();
        let statuses = self.store.get_online(&profile_ids).await?;
        let status_map: HashMap<Id, Status> =
            statuses.into_iter().map(|s| (s.user_id, s)).collect();

        // Step 5 — broadcast-token policy.
        let over_limit = profiles.len() > self.config.max_notifications_per_channel;
        if here {
            if over_limit {
                self.advise_suppressed(post, channel, i18n::keys::HERE_SUPPRESSED).await;
            } else {
                for status in status_map.values() {
                    if status.is_online() && status.user_id != post.user_id {
                        recipients.insert(status.user_id);
                    }
                }
            }
        }
        if channel_flag && over_limit {
            self.advise_suppressed(post, channel, i18n::keys::CHANNEL_SUPPRESSED).await;
        }
        if all_flag && over_limit {
            self.advise_suppressed(post, channel, i18n::keys::ALL_SUPPRESSED).await;
        }

        // Step 6 — email.
        if self.config.send_email_notifications {
            let file_infos = self.store.get_file_infos_for_post(post.id).await?;
            for uid in &recipients {
                if let Some(recipient) = profile_map.get(uid) {
                    if let Err(e) = self
                        .send_email(post, team, channel, author, recipient, &status_map, &file_infos)
                        .await
                    {
                        tracing::warn!(error = ?e, user_id = %uid, "email notification failed");
                    }
                }
            }
        }

        // Step 7 — push. Skipped outright if disabled, or if the configured
        // push server is the managed relay and licensing doesn't permit it.
        if self.config.push_notifications_enabled() {
            for uid in &recipients {
                if let Some(recipient) = profile_map.get(uid) {
                    if !allows_push(status_map.get(uid)) {
                        continue;
                    }
                    if let Err(e) = self
                        .send_push_to_recipient(post, team, channel, recipient, true, author)
                        .await
                    {
                        tracing::warn!(error = ?e, user_id = %uid, "push notification failed");
                    }
                }
            }

            let activity_ids = all_activity_push_user_ids(&profiles, post.user_id, from_webhook, post.is_system());
            for uid in activity_ids.difference(&recipients) {
                if let Some(recipient) = profile_map.get(uid) {
                    if !allows_push(status_map.get(uid)) {
                        continue;
                    }
                    if let Err(e) = self
                        .send_push_to_recipient(post, team, channel, recipient, false, author)
                        .await
                    {
                        tracing::warn!(error = ?e, user_id = %uid, "push notification failed");
                    }
                }
            }
        }

        // Step 8 — realtime broadcast.
        let file_infos = self.store.get_file_infos_for_post(post.id).await?;
        let has_attachments = !post.file_id_list().is_empty();
        let has_image_attachment = file_infos.iter().any(FileInfo::is_image);
        let payload = json!({
            "post": post,
            "channel_type": channel.r#type,
            "channel_name": channel.name,
            "sender_name": sender_display_name(post, author),
            "team_id": team.id,
            "has_attachments": has_attachments,
            "has_image_attachment": has_image_attachment,
            "mentioned_user_ids": recipients.iter().collect::<Vec<_>>(),
        });
        let event = Event::new(event_type::POSTED, payload).for_channel(channel.id);
        self.events.publish(event).await;

        Ok(())
    }

    async fn advise_potential_others(&self, post: &Post, channel: &Channel, usernames: &[String]) {
        let mut args = HashMap::new();
        let key = if usernames.len() == 1 {
            args.insert("username".to_string(), usernames[0].clone());
            i18n::keys::POTENTIAL_OTHER_ONE
        } else {
            args.insert("usernames".to_string(), usernames.join(", "));
            i18n::keys::POTENTIAL_OTHER_MANY
        };
        let message = self.translator.t(key, "en", &args);
        let emitter = EphemeralEmitter::new(self.events.clone());
        emitter.emit(post.user_id, channel.id, message).await;
    }

    async fn advise_suppressed(&self, post: &Post, channel: &Channel, key: &str) {
        let message = self.translator.t(key, "en", &HashMap::new());
        let emitter = EphemeralEmitter::new(self.events.clone());
        emitter.emit(post.user_id, channel.id, message).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_email(
        &self,
        post: &Post,
        team: &Team,
        channel: &Channel,
        author: &Profile,
        recipient: &Profile,
        status_map: &HashMap<Id, Status>,
        file_infos: &[FileInfo],
    ) -> AppResult<()> {
        if !recipient.notify().email_enabled() {
            return Ok(());
        }
        if status_map.get(&recipient.id).is_some_and(Status::is_online) {
            return Ok(());
        }

        if self.config.enable_email_batching {
            let interval = self
                .store
                .get_preference(recipient.id, preference_category::NOTIFICATIONS, preference_name::EMAIL_INTERVAL)
                .await?;
            let is_immediate = interval
                .map(|p| p.value == preference_email_interval_value::IMMEDIATE)
                .unwrap_or(true);
            if !is_immediate {
                tracing::debug!(user_id = %recipient.id, "email deferred to batch delivery");
                return Ok(());
            }
        }

        let sender = sender_display_name(post, author);
        let body = email::message_for_notification(post, file_infos, self.translator.as_ref(), &recipient.locale);

        let mut args = HashMap::new();
        args.insert("sender".to_string(), sender.clone());
        args.insert("site_name".to_string(), self.config.site_name.clone());
        args.insert("channel".to_string(), channel.display_name.clone());

        let subject_key = if channel.r#type == ChannelType::Direct {
            i18n::keys::EMAIL_SUBJECT_DIRECT
        } else {
            i18n::keys::EMAIL_SUBJECT_CHANNEL
        };
        let subject = self.translator.t(subject_key, &recipient.locale, &args);

        let link_team = if channel.r#type == ChannelType::Direct {
            let recipient_teams = self.store.get_teams_by_user_id(recipient.id).await?;
            if recipient_teams.iter().any(|t| t.id == team.id) {
                team.clone()
            } else {
                email::resolve_deep_link_team(&recipient_teams, team, &self.config.site_name)
            }
        } else {
            team.clone()
        };

        let full_body = format!("{body}\n\n{}/{}", self.config.site_name, link_team.name);
        self.email.send(&recipient.email, &subject, &full_body).await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_push_to_recipient(
        &self,
        post: &Post,
        team: &Team,
        channel: &Channel,
        recipient: &Profile,
        was_mentioned: bool,
        author: &Profile,
    ) -> AppResult<()> {
        let sessions = self.store.get_sessions_with_active_device_ids(recipient.id).await?;
        if sessions.is_empty() {
            return Ok(());
        }
        let badge = self.store.get_unread_count(channel.id, recipient.id).await?;
        let sender = sender_display_name(post, author);
        let message = self.push_message_body(post, channel, &sender, was_mentioned, &recipient.locale);
        let category = if channel.r#type == ChannelType::Direct {
            "dm".to_string()
        } else {
            String::new()
        };

        for session in sessions {
            let notification = PushNotification {
                kind: PushType::Message,
                badge,
                team_id: team.id,
                channel_id: channel.id,
                channel_name: channel.display_name.clone(),
                category: category.clone(),
                message: message.clone(),
                device_id: session.device_id.unwrap_or_default(),
                platform: session.platform,
                server_id: self.config.server_id.clone(),
            };
            self.push.send_push(&notification).await;
        }
        Ok(())
    }

    fn push_message_body(
        &self,
        post: &Post,
        channel: &Channel,
        sender: &str,
        was_mentioned: bool,
        locale: &str,
    ) -> String {
        match self.config.push_notification_contents {
            PushContentSetting::Full => strip_mention_tags(&post.message),
            PushContentSetting::Generic => {
                let mut args = HashMap::new();
                args.insert("sender".to_string(), sender.to_string());
                args.insert("channel".to_string(), channel.display_name.clone());
                let key = if channel.r#type == ChannelType::Direct {
                    i18n::keys::PUSH_MESSAGE_GENERIC
                } else if was_mentioned {
                    i18n::keys::PUSH_MENTION_GENERIC
                } else {
                    i18n::keys::PUSH_POSTED_GENERIC
                };
                self.translator.t(key, locale, &args)
            }
        }
    }

    /// Sends a `clear`-type push with the channel's current unread count
    /// (spec §4.D `ClearPush`), used when a user reads a channel from
    /// another device.
    pub async fn clear_push(&self, user_id: Id, channel_id: Id) -> AppResult<()> {
        let channel = self.store.get_channel(channel_id).await?;
        let sessions = self.store.get_sessions_with_active_device_ids(user_id).await?;
        let badge = self.store.get_unread_count(channel_id, user_id).await?;

        for session in sessions {
            let notification = PushNotification {
                kind: PushType::Clear,
                badge,
                team_id: channel.team_id,
                channel_id,
                channel_name: channel.display_name.clone(),
                category: String::new(),
                message: String::new(),
                device_id: session.device_id.unwrap_or_default(),
                platform: session.platform,
                server_id: self.config.server_id.clone(),
            };
            self.push.send_push(&notification).await;
        }
        Ok(())
    }
}

/// Display name shown to recipients: `override_username` only applies to
/// webhook-generated posts (spec §4.C, SPEC_FULL §4.D). The `Profile` model
/// here carries only `username`/`first_name`, not a nickname/last-name pair,
/// so there is no further `name_format` branching to do beyond that
/// fallback.
fn sender_display_name(post: &Post, author: &Profile) -> String {
    if post.from_webhook() {
        if let Some(name) = post.override_username() {
            return name.to_string();
        }
    }
    author.username.clone()
}

/// "full" push content strips `@mention` tokens from the raw message text
/// rather than showing them verbatim (spec §4.D step 7).
fn strip_mention_tags(message: &str) -> String {
    message
        .split_whitespace()
        .filter(|word| !word.starts_with('@'))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `DoesStatusAllowPushNotification` (spec §4.D step 7) is named as an
/// external policy honouring DND, channel mute, and the desktop/mobile
/// overlap window. Channel mute and the overlap window need state this
/// crate's `Preference` categories don't model; the DND half is implemented
/// directly against `Status` since it's already tracked here.
fn allows_push(status: Option<&Status>) -> bool {
    !status.is_some_and(Status::is_dnd)
}

/// Users in the channel whose `push` setting is `all`, excluding the author
/// unless the post is webhook-generated, and never for system posts (spec
/// §4.D `allActivityPushUserIds`).
fn all_activity_push_user_ids(
    profiles: &[Profile],
    author_id: Id,
    from_webhook: bool,
    is_system: bool,
) -> HashSet<Id> {
    if is_system {
        return HashSet::new();
    }
    profiles
        .iter()
        .filter(|p| p.notify().push() == PushSetting::All)
        .filter(|p| from_webhook || p.id != author_id)
        .map(|p| p.id)
        .collect()
}
