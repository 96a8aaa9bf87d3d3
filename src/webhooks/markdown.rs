/// Rewrites Slack-style `<url|label>` spans into `[label](url)` markdown
/// (spec §4.E `CreateWebhookPost`). A span with no `|label` part rewrites to
/// a bare `<url>` autolink instead, since there is no label to use.
pub fn rewrite_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;

        out.push_str(&rest[..start]);
        let span = &rest[start + 1..end];

        match span.split_once('|') {
            Some((url, label)) => out.push_str(&format!("[{label}]({url})")),
            None => out.push_str(&format!("<{span}>")),
        }

        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
