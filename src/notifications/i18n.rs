//! Translator boundary (SPEC_FULL §4.D [AMBIENT]).
//!
//! spec.md places string localisation out of scope, referenced only as an
//! external collaborator. This is that collaborator's interface, plus one
//! concrete implementation covering the handful of keys the dispatcher
//! actually calls.

use std::collections::HashMap;

pub trait Translator: Send + Sync {
    fn t(&self, key: &str, locale: &str, args: &HashMap<String, String>) -> String;
}

/// Template keys the dispatcher and its collaborators look up.
pub mod keys {
    pub const HERE_SUPPRESSED: &str = "notification.broadcast.here_suppressed";
    pub const CHANNEL_SUPPRESSED: &str = "notification.broadcast.channel_suppressed";
    pub const ALL_SUPPRESSED: &str = "notification.broadcast.all_suppressed";
    pub const POTENTIAL_OTHER_ONE: &str = "notification.potential_other.one";
    pub const POTENTIAL_OTHER_MANY: &str = "notification.potential_other.many";

    pub const PUSH_MENTION_GENERIC: &str = "push.mention.generic";
    pub const PUSH_POSTED_GENERIC: &str = "push.posted.generic";
    pub const PUSH_MESSAGE_GENERIC: &str = "push.message.generic";

    pub const EMAIL_SUBJECT_DIRECT: &str = "email.subject.direct";
    pub const EMAIL_SUBJECT_CHANNEL: &str = "email.subject.channel";
    pub const EMAIL_BODY_SENT_IMAGES: &str = "email.body.sent_images";
    pub const EMAIL_BODY_SENT_FILES: &str = "email.body.sent_files";
}

/// Covers every key in [`keys`] for `en`; any other locale falls back to the
/// same English text rather than failing the call, matching how the
/// original degrades when a translation bundle is missing.
pub struct EnglishTranslator;

impl Translator for EnglishTranslator {
    fn t(&self, key: &str, _locale: &str, args: &HashMap<String, String>) -> String {
        let get = |k: &str| args.get(k).map(String::as_str).unwrap_or("");

        match key {
            keys::HERE_SUPPRESSED => {
                "@here was not sent because this channel has too many members".to_string()
            }
            keys::CHANNEL_SUPPRESSED => {
                "@channel was not sent because this channel has too many members".to_string()
            }
            keys::ALL_SUPPRESSED => {
                "@all was not sent because this channel has too many members".to_string()
            }
            keys::POTENTIAL_OTHER_ONE => {
                format!("@{} did not get notified by this mention because they are not in the channel", get("username"))
            }
            keys::POTENTIAL_OTHER_MANY => {
                format!("{} did not get notified by this mention because they are not in the channel", get("usernames"))
            }
            keys::PUSH_MENTION_GENERIC => {
                format!("{} mentioned you in {}", get("sender"), get("channel"))
            }
            keys::PUSH_POSTED_GENERIC => {
                format!("{} posted in {}", get("sender"), get("channel"))
            }
            keys::PUSH_MESSAGE_GENERIC => format!("{} sent you a message", get("sender")),
            keys::EMAIL_SUBJECT_DIRECT => {
                format!("New message from {} on {}", get("sender"), get("site_name"))
            }
            keys::EMAIL_SUBJECT_CHANNEL => format!(
                "New notification in {} on {}",
                get("channel"),
                get("site_name")
            ),
            keys::EMAIL_BODY_SENT_IMAGES => format!("sent {} image(s)", get("count")),
            keys::EMAIL_BODY_SENT_FILES => format!("sent {} file(s)", get("count")),
            other => other.to_string(),
        }
    }
}
