//! Mention tokenisation and resolution (spec §4.A).

pub mod keyword_index;

use std::collections::HashSet;

pub use keyword_index::KeywordIndex;

use crate::models::Id;

/// Output of [`parse`] (spec §3 `MentionResult`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionResult {
    pub mentioned: HashSet<Id>,
    pub potential_others: Vec<String>,
    pub here: bool,
    pub channel: bool,
    pub all: bool,
}

/// Runes that delimit a word into sub-tokens (spec §4.A step 3d). Letters,
/// digits and `_` never split; everything else does.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits `word` into the runs step 3d calls "sub-tokens". A run prefixed by
/// `@` keeps the `@` attached (so `"@Alice,"` yields `["@Alice"]`, not
/// `["Alice"]`) — lookups against [`KeywordIndex`] depend on that prefix
/// surviving the split.
fn split_tokens(word: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = word.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '@' && i + 1 < chars.len() && is_word_char(chars[i + 1]) {
            let start = i;
            i += 1;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else if is_word_char(chars[i]) {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            tokens.push(chars[start..i].iter().collect());
        } else {
            i += 1;
        }
    }
    tokens
}

/// Records matches for one already-split token against both the
/// case-insensitive and case-sensitive halves of the index (step 3 b/c).
fn lookup(token: &str, index: &KeywordIndex, mentioned: &mut HashSet<Id>) -> bool {
    let mut matched = false;
    if let Some(ids) = index.get(&token.to_lowercase()) {
        mentioned.extend(ids.iter().copied());
        matched = true;
    }
    if let Some(ids) = index.get(token) {
        mentioned.extend(ids.iter().copied());
        matched = true;
    }
    matched
}

/// Resolves mentions in `text` against `index` (spec §4.A).
///
/// The flagged indexing bug in step 3d (`word[1:len(splitWord)]`) is
/// resolved per the spec's documented safe rewrite: a potential
/// out-of-channel username is the leading `@`-run of the *original* word
/// with its `@` stripped, not a slice computed from an unrelated split
/// token's length.
pub fn parse(text: &str, index: &KeywordIndex) -> MentionResult {
    let mut result = MentionResult::default();

    for word in text.split_ascii_whitespace() {
        match word {
            "@here" => result.here = true,
            "@channel" => result.channel = true,
            "@all" => result.all = true,
            _ => {}
        }

        let mut matched = lookup(word, index, &mut result.mentioned);

        if word == "@here" || word == "@channel" || word == "@all" {
            matched = true;
        }

        if matched {
            continue;
        }

        let sub_tokens = split_tokens(word);
        let mut sub_matched = false;
        for token in &sub_tokens {
            match token.as_str() {
                "@here" => {
                    result.here = true;
                    sub_matched = true;
                }
                "@channel" => {
                    result.channel = true;
                    sub_matched = true;
                }
                "@all" => {
                    result.all = true;
                    sub_matched = true;
                }
                _ => {
                    if lookup(token, index, &mut result.mentioned) {
                        sub_matched = true;
                    }
                }
            }
        }

        if word.starts_with('@') && !sub_matched {
            if let Some(first) = sub_tokens.first() {
                if let Some(username) = first.strip_prefix('@') {
                    result.potential_others.push(username.to_string());
                }
            }
        }
    }

    result
}
