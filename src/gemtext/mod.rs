//! Gemtext line classification
//!
//! Shared by the HTML renderer and the feed generator.

pub mod feed;
pub mod html;

pub use feed::{join_path, render_feed, FeedEntry};
pub use html::{render_html, RenderedPage};

/// One classified gemtext line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Text(&'a str),
    Link { path: &'a str, text: &'a str },
    PreformatToggle { alt_text: &'a str },
    Preformatted(&'a str),
    Heading { level: u8, text: &'a str },
    ListItem(&'a str),
    Quote(&'a str),
}

/// Classify a line given whether a preformatted block is open
pub fn classify(line: &str, preformatted: bool) -> Line<'_> {
    if preformatted {
        return if line.starts_with("```") {
            Line::PreformatToggle { alt_text: "" }
        } else {
            Line::Preformatted(line)
        };
    }

    if let Some(alt) = line.strip_prefix("```") {
        Line::PreformatToggle {
            alt_text: alt.trim(),
        }
    } else if line.starts_with("####") {
        Line::Text(line.trim())
    } else if let Some(text) = line.strip_prefix("###") {
        Line::Heading {
            level: 3,
            text: text.trim(),
        }
    } else if let Some(text) = line.strip_prefix("##") {
        Line::Heading {
            level: 2,
            text: text.trim(),
        }
    } else if let Some(text) = line.strip_prefix('#') {
        Line::Heading {
            level: 1,
            text: text.trim(),
        }
    } else if let Some(text) = line.strip_prefix("* ") {
        Line::ListItem(text.trim())
    } else if let Some(rest) = line
        .strip_prefix("=> ")
        .or_else(|| line.strip_prefix("=>\t"))
    {
        let rest = rest.trim();
        match rest.split_once(char::is_whitespace) {
            Some((path, text)) => Line::Link {
                path,
                text: text.trim(),
            },
            None => Line::Link {
                path: rest,
                text: "",
            },
        }
    } else if let Some(text) = line.strip_prefix('>') {
        Line::Quote(text.trim())
    } else {
        Line::Text(line.trim())
    }
}

/// Iterate a document's lines with preformatted state tracked
pub fn lines(document: &str) -> impl Iterator<Item = Line<'_>> {
    let mut preformatted = false;
    document.split('\n').map(move |raw| {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let line = classify(raw, preformatted);
        if matches!(line, Line::PreformatToggle { .. }) {
            preformatted = !preformatted;
        }
        line
    })
}

/// Escape `&`, `<` and `>`
pub fn escape_content(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape content plus both quote characters, for attributes
pub fn escape_attribute(text: &str) -> String {
    escape_content(text)
        .replace('\'', "&#39;")
        .replace('"', "&#34;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headings() {
        assert_eq!(
            classify("# Title", false),
            Line::Heading {
                level: 1,
                text: "Title"
            }
        );
        assert_eq!(
            classify("###Deep ", false),
            Line::Heading {
                level: 3,
                text: "Deep"
            }
        );
        assert_eq!(classify("#### too deep", false), Line::Text("#### too deep"));
    }

    #[test]
    fn test_links() {
        assert_eq!(
            classify("=> /blog/post.gmi  2024-01-02 - Post", false),
            Line::Link {
                path: "/blog/post.gmi",
                text: "2024-01-02 - Post"
            }
        );
        assert_eq!(
            classify("=>\tgemini://example.org", false),
            Line::Link {
                path: "gemini://example.org",
                text: ""
            }
        );
        assert_eq!(classify("=>nospace", false), Line::Text("=>nospace"));
    }

    #[test]
    fn test_preformatted_block() {
        let doc = "```ascii art\n# not a heading\n```\n* item";
        let classified: Vec<_> = lines(doc).collect();
        assert_eq!(
            classified,
            vec![
                Line::PreformatToggle {
                    alt_text: "ascii art"
                },
                Line::Preformatted("# not a heading"),
                Line::PreformatToggle { alt_text: "" },
                Line::ListItem("item"),
            ]
        );
    }

    #[test]
    fn test_quote_and_crlf() {
        let classified: Vec<_> = lines("> quoted\r\nplain\r\n").collect();
        assert_eq!(
            classified,
            vec![Line::Quote("quoted"), Line::Text("plain"), Line::Text("")]
        );
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_content("<a & b>"), "&lt;a &amp; b&gt;");
        assert_eq!(escape_attribute("it's \"x\""), "it&#39;s &#34;x&#34;");
    }
}
