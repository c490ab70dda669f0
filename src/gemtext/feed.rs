//! Atom feed from a gemtext index page
//!
//! Link lines whose text reads `YYYY-MM-DD <sep> title` become entries.

use super::{escape_attribute, lines, Line};
use url::Url;

/// Separators accepted between the date and the title
const SEPARATORS: &[char] = &['-', '|', '–', '—', '―', '‖', ':'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// RFC 3339 timestamp at noon UTC of the entry date
    pub updated: String,
}

/// Join a base URL and a path with exactly one slash between them
pub fn join_path(base: &str, elem: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        elem.trim_start_matches('/')
    )
}

fn is_date(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// Find `YYYY-MM-DD<ws><sep><ws><title>` anywhere in the link text
pub fn parse_entry_text(text: &str) -> Option<(String, String)> {
    for (start, _) in text.char_indices() {
        let Some(date) = text.get(start..start + 10) else {
            continue;
        };
        if !is_date(date) {
            continue;
        }
        let mut rest = text[start + 10..].chars();
        let ws = rest.next();
        let sep = rest.next();
        let ws2 = rest.next();
        let matches = ws.is_some_and(char::is_whitespace)
            && sep.is_some_and(|c| SEPARATORS.contains(&c))
            && ws2.is_some_and(char::is_whitespace);
        if matches {
            return Some((date.to_string(), rest.as_str().to_string()));
        }
    }
    None
}

/// Entries of a gemtext page, newest first
pub fn feed_entries(document: &str, origin: &str) -> (String, Vec<FeedEntry>) {
    let mut title: Option<String> = None;
    let mut entries = Vec::new();

    for line in lines(document) {
        match line {
            Line::Heading { level: 1, text } if title.is_none() => {
                title = Some(escape_attribute(text));
            },
            Line::Link { path, text } => {
                let Some((date, entry_title)) = parse_entry_text(text) else {
                    continue;
                };
                let link = if Url::parse(path).is_ok() {
                    path.to_string()
                } else {
                    join_path(origin, path)
                };
                entries.push(FeedEntry {
                    title: escape_attribute(&entry_title),
                    link,
                    updated: format!("{}T12:00:00Z", date),
                });
            },
            _ => {},
        }
    }

    // stable sort keeps page order among same-day entries
    entries.sort_by(|a, b| b.updated.cmp(&a.updated));
    (title.unwrap_or_default(), entries)
}

/// Render the Atom document, or an empty string when there are no entries
pub fn render_feed(document: &str, origin: &str, source_path: &str) -> String {
    let (title, entries) = feed_entries(document, origin);
    let Some(newest) = entries.first() else {
        return String::new();
    };
    let feed_url = escape_attribute(&join_path(origin, source_path));

    let mut out = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <feed xmlns=\"http://www.w3.org/2005/Atom\">\n\n\
         \x20 <title>{}</title>\n\
         \x20 <link href=\"{}\"/>\n\
         \x20 <updated>{}</updated>\n\
         \x20 <id>{}</id>\n\n",
        title, feed_url, newest.updated, feed_url
    );
    for entry in &entries {
        let link = escape_attribute(&entry.link);
        out.push_str(&format!(
            "  <entry>\n    <title>{}</title>\n    <link rel=\"alternate\" href=\"{}\"/>\n    <id>{}</id>\n    <updated>{}</updated>\n  </entry>\n\n",
            entry.title, link, link, entry.updated
        ));
    }
    out.push_str("</feed>");
    out
}
