use std::collections::HashMap;

use crate::models::{Id, Profile};

/// Per-channel `keyword -> user-ids` map (spec §4.B).
///
/// Lowercase keys (`@username`, `mention_keys` entries, `@channel`/`@all`)
/// live alongside case-sensitive first-name keys in the same map; the
/// parser decides which casing to look up at each step, not the index.
#[derive(Debug, Default)]
pub struct KeywordIndex {
    keys: HashMap<String, Vec<Id>>,
}

impl KeywordIndex {
    pub fn get(&self, key: &str) -> Option<&[Id]> {
        self.keys.get(key).map(Vec::as_slice)
    }

    fn add(&mut self, key: String, user_id: Id) {
        self.keys.entry(key).or_default().push(user_id);
    }

    /// Builds the index for one channel's membership.
    ///
    /// `max_notifications_per_channel` gates `@channel`/`@all`: they're only
    /// populated when the channel is smaller than this threshold, to keep
    /// broadcast tokens from fanning out to enormous channels (spec §4.B).
    pub fn build(profiles: &[Profile], max_notifications_per_channel: usize) -> Self {
        let mut index = KeywordIndex::default();
        let gate_open = profiles.len() < max_notifications_per_channel;

        for profile in profiles {
            index.add(format!("@{}", profile.username.to_lowercase()), profile.id);

            for key in profile.notify().mention_keys() {
                index.add(key.to_lowercase(), profile.id);
            }

            if profile.notify().first_name_enabled() && !profile.first_name.is_empty() {
                index.add(profile.first_name.clone(), profile.id);
            }

            if gate_open && profile.notify().channel_mentions_enabled() {
                index.add("@channel".to_string(), profile.id);
                index.add("@all".to_string(), profile.id);
            }
        }

        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotifyProps;
    use std::collections::HashMap as Map;

    fn profile(username: &str, first_name: &str, notify: &[(&str, &str)]) -> Profile {
        let mut map = Map::new();
        for (k, v) in notify {
            map.insert(k.to_string(), v.to_string());
        }
        Profile {
            id: Id::new(),
            username: username.to_string(),
            first_name: first_name.to_string(),
            locale: "en".to_string(),
            email: format!("{username}@example.com"),
            delete_at: 0,
            notify_props: sqlx::types::Json(NotifyProps(map)),
        }
    }

    #[test]
    fn builds_username_and_mention_key_entries() {
        let p = profile("bob", "", &[("mention_keys", "dragon,wyrm")]);
        let idx = KeywordIndex::build(&[p.clone()], 1000);
        assert_eq!(idx.get("@bob").unwrap(), &[p.id]);
        assert_eq!(idx.get("dragon").unwrap(), &[p.id]);
        assert_eq!(idx.get("wyrm").unwrap(), &[p.id]);
    }

    #[test]
    fn first_name_key_is_case_sensitive() {
        let p = profile("bob", "Robert", &[("first_name", "true")]);
        let idx = KeywordIndex::build(&[p.clone()], 1000);
        assert_eq!(idx.get("Robert").unwrap(), &[p.id]);
        assert!(idx.get("robert").is_none());
    }

    #[test]
    fn channel_and_all_gated_by_size() {
        let p = profile("bob", "", &[("channel", "true")]);
        let under_gate = KeywordIndex::build(&[p.clone()], 2);
        assert_eq!(under_gate.get("@channel").unwrap(), &[p.id]);
        assert_eq!(under_gate.get("@all").unwrap(), &[p.id]);

        let q = profile("carol", "", &[("channel", "true")]);
        let over_gate = KeywordIndex::build(&[p, q], 2);
        assert!(over_gate.get("@channel").is_none());
        assert!(over_gate.get("@all").is_none());
    }

    #[test]
    fn channel_key_skipped_when_profile_opts_out() {
        let p = profile("bob", "", &[("channel", "false")]);
        let idx = KeywordIndex::build(&[p], 1000);
        assert!(idx.get("@channel").is_none());
    }
}
