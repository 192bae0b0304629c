//! Markdown export of a transcript.
//!
//! Format: one block per turn, `### {role} — {RFC 3339 timestamp}` followed
//! by a blank line and the content.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use super::transcript::{Role, Turn};

/// Serialise turns to Markdown.
pub fn to_markdown(turns: &[Turn]) -> String {
    let mut out = String::new();
    for t in turns {
        out.push_str(&format!(
            "### {} — {}\n\n{}\n\n",
            t.role,
            t.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            t.content
        ));
    }
    out
}

/// Parse Markdown produced by [`to_markdown`] back into turns.
///
/// A line is a turn header only when it follows a blank line (or starts the
/// text) and reads exactly `### {user|assistant} — {RFC 3339}`. Any other
/// `### ` line, such as a heading inside a reply, stays in the body. Text
/// before the first header is ignored.
pub fn parse_markdown(text: &str) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut current: Option<(Role, DateTime<Utc>, Vec<&str>)> = None;
    let mut after_blank = true;

    for line in text.lines() {
        let header = if after_blank { parse_header(line) } else { None };
        after_blank = line.trim().is_empty();

        match header {
            Some((role, at)) => {
                if let Some(turn) = current.take().map(flush) {
                    turns.push(turn);
                }
                current = Some((role, at, Vec::new()));
            }
            None => {
                if let Some((_, _, ref mut lines)) = current {
                    lines.push(line);
                }
            }
        }
    }
    if let Some(turn) = current.map(flush) {
        turns.push(turn);
    }
    turns
}

fn parse_header(line: &str) -> Option<(Role, DateTime<Utc>)> {
    let (role, ts) = line.strip_prefix("### ")?.split_once(" — ")?;
    let role = match role {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };
    let at = DateTime::parse_from_rfc3339(ts.trim_end()).ok()?.with_timezone(&Utc);
    Some((role, at))
}

fn flush((role, at, lines): (Role, DateTime<Utc>, Vec<&str>)) -> Turn {
    Turn { role, content: lines.join("\n").trim().to_string(), at }
}

/// Write turns as Markdown to `path`, creating parent directories.
pub async fn save(turns: &[Turn], path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, to_markdown(turns)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn markdown_shape() {
        let md = to_markdown(&[Turn::user("Hello"), Turn::assistant("Hi there")]);
        assert!(md.starts_with("### user — "));
        assert!(md.contains("\n\nHello\n\n### assistant — "));
        assert!(md.ends_with("Hi there\n\n"));
    }

    #[test]
    fn parse_reads_back_roles_and_multiline_content() {
        let turns = vec![Turn::user("line one\nline two"), Turn::assistant("reply")];
        let parsed = parse_markdown(&to_markdown(&turns));

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].role, Role::User);
        assert_eq!(parsed[0].content, "line one\nline two");
        assert_eq!(parsed[1].content, "reply");
        assert_eq!(parsed[1].at.timestamp(), turns[1].at.timestamp());
    }

    #[test]
    fn preamble_and_malformed_headers_are_not_turns() {
        let text = "preamble\n\n### system — 2024-01-01T00:00:00Z\n\nignored\n\n\
                    ### user — 2024-01-01T00:00:00Z\n\nkept\n\n### user — bad-ts\n\nstill kept\n";
        let parsed = parse_markdown(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "kept\n\n### user — bad-ts\n\nstill kept");
        assert_eq!(parsed[0].at.timestamp(), 1_704_067_200);
    }

    #[test]
    fn headings_inside_a_reply_survive() {
        let turns = vec![
            Turn::user("steps?"),
            Turn::assistant("Sure.\n\n### Step 1\n\nDo it.\n### assistant — 2024-01-01T00:00:00Z"),
        ];
        let parsed = parse_markdown(&to_markdown(&turns));

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].content, "steps?");
        assert_eq!(parsed[1].content, turns[1].content);
    }

    #[tokio::test]
    async fn save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exports").join("chat.md");
        save(&[Turn::user("hi")], &path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(parse_markdown(&text)[0].content, "hi");
    }
}
