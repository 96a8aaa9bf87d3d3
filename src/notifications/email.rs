//! Email collaborator (spec §4.D step 6, SPEC_FULL §4.D supplements).

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::models::{FileInfo, Id, Post, Team};
use crate::notifications::i18n::{keys, Translator};

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str);
}

/// SMTP implementation over `lettre`'s async transport. Send failures are
/// logged and swallowed — the dispatcher never fails a post's foreground
/// path because an email didn't go out (spec §7).
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpEmailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(SmtpEmailSender {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) {
        let message = match Message::builder()
            .from(self.from_address.parse().unwrap_or_else(|_| {
                "notifications@localhost".parse().expect("static address parses")
            }))
            .to(match to.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::warn!(error = ?e, %to, "invalid recipient address, dropping email");
                    return;
                }
            })
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
        {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = ?e, %to, "failed to build notification email");
                return;
            }
        };

        if let Err(e) = self.transport.send(message).await {
            tracing::warn!(error = ?e, %to, "smtp send failed");
        }
    }
}

/// `getMessageForNotification` (SPEC_FULL §4.D): when the post has no text
/// but carries attachments, the notification body describes the attachment
/// count instead of showing an empty message.
pub fn message_for_notification(
    post: &Post,
    file_infos: &[FileInfo],
    translator: &dyn Translator,
    locale: &str,
) -> String {
    if !post.message.trim().is_empty() {
        return post.message.clone();
    }
    if file_infos.is_empty() {
        return post.message.clone();
    }

    let all_images = file_infos.iter().all(FileInfo::is_image);
    let mut args = std::collections::HashMap::new();
    args.insert("count".to_string(), file_infos.len().to_string());

    if all_images {
        translator.t(keys::EMAIL_BODY_SENT_IMAGES, locale, &args)
    } else {
        translator.t(keys::EMAIL_BODY_SENT_FILES, locale, &args)
    }
}

/// Picks the team a direct-message email's deep link should point at when
/// the recipient's own team differs from the post's team (SPEC_FULL §4.D):
/// the post's team if the recipient is actually on it, else the recipient's
/// first team, else a `select_team` placeholder carrying the site name.
pub fn resolve_deep_link_team(recipient_teams: &[Team], post_team: &Team, site_name: &str) -> Team {
    if recipient_teams.iter().any(|t| t.id == post_team.id) {
        return post_team.clone();
    }
    if let Some(first) = recipient_teams.first() {
        return first.clone();
    }
    Team {
        id: Id::nil(),
        owner_id: Id::nil(),
        name: "select_team".to_string(),
        display_name: site_name.to_string(),
        create_at: Utc::now(),
        delete_at: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::i18n::EnglishTranslator;
    use serde_json::json;

    fn team(id: Id) -> Team {
        Team {
            id,
            owner_id: Id::new(),
            name: "team".to_string(),
            display_name: "Team".to_string(),
            create_at: Utc::now(),
            delete_at: 0,
        }
    }

    fn post_with_message(message: &str) -> Post {
        Post {
            id: Id::new(),
            user_id: Id::new(),
            channel_id: Id::new(),
            root_id: None,
            parent_id: None,
            create_at: Utc::now(),
            update_at: Utc::now(),
            delete_at: 0,
            message: message.to_string(),
            post_type: crate::models::PostType::User,
            file_ids: json!([]),
            props: json!({}),
            hashtags: String::new(),
        }
    }

    fn image_file_info(post_id: Id) -> FileInfo {
        FileInfo {
            id: Id::new(),
            post_id: Some(post_id),
            name: "cat.png".to_string(),
            mime_type: "image/png".to_string(),
            create_at: Utc::now(),
            delete_at: 0,
        }
    }

    #[test]
    fn nonempty_message_passes_through_unchanged() {
        let post = post_with_message("hello there");
        let translator = EnglishTranslator;
        assert_eq!(
            message_for_notification(&post, &[], &translator, "en"),
            "hello there"
        );
    }

    #[test]
    fn empty_message_with_images_describes_attachment_count() {
        let post = post_with_message("");
        let files = vec![image_file_info(post.id), image_file_info(post.id)];
        let translator = EnglishTranslator;
        let body = message_for_notification(&post, &files, &translator, "en");
        assert!(body.contains('2'));
        assert!(body.contains("image"));
    }

    #[test]
    fn prefers_post_team_when_recipient_is_on_it() {
        let post_team = team(Id::new());
        let other = team(Id::new());
        let resolved = resolve_deep_link_team(&[other.clone(), post_team.clone()], &post_team, "Site");
        assert_eq!(resolved.id, post_team.id);
    }

    #[test]
    fn falls_back_to_recipients_first_team() {
        let post_team = team(Id::new());
        let first = team(Id::new());
        let resolved = resolve_deep_link_team(&[first.clone()], &post_team, "Site");
        assert_eq!(resolved.id, first.id);
    }

    #[test]
    fn falls_back_to_placeholder_when_recipient_has_no_teams() {
        let post_team = team(Id::new());
        let resolved = resolve_deep_link_team(&[], &post_team, "My Site");
        assert_eq!(resolved.name, "select_team");
        assert_eq!(resolved.display_name, "My Site");
    }
}
