/// Derives hashtags from a post's message text (SPEC_FULL §3, ported from
/// the original's `model.ParseHashtags`).
///
/// A whitespace-delimited token is a hashtag if it starts with `#`, is
/// followed by at least one letter, and contains no other `#`. The hashtag
/// text excludes the leading `#` and any trailing punctuation.
pub fn parse_hashtags(message: &str) -> String {
    let mut tags = Vec::new();

    for token in message.split_whitespace() {
        let Some(rest) = token.strip_prefix('#') else {
            continue;
        };
        if rest.is_empty() || rest.contains('#') {
            continue;
        }
        if !rest.chars().next().is_some_and(|c| c.is_alphabetic()) {
            continue;
        }

        let trimmed = rest.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
        if trimmed.is_empty() {
            continue;
        }

        let tag = format!("#{trimmed}");
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    tags.join(" ")
}
