//! Gemtext to HTML

use super::{escape_attribute, escape_content, lines, Line};
use crate::content::mime_for_path;
use url::Url;

/// HTML fragment and the title picked for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub html: String,
    pub title: String,
}

/// Render a gemtext document into `<div id="content">`
///
/// The first level-1 heading becomes the title, otherwise `default_title`.
pub fn render_html(document: &str, default_title: &str) -> RenderedPage {
    let mut html = String::from("<div id=\"content\">\n");
    let mut title: Option<String> = None;
    let mut in_pre = false;

    for line in lines(document) {
        match line {
            Line::Heading { level, text } => {
                html.push_str(&format!(
                    "<h{}>{}</h{}>\n",
                    level,
                    escape_content(text),
                    level
                ));
                if level == 1 && title.is_none() {
                    title = Some(escape_attribute(text));
                }
            },
            Line::ListItem(text) => {
                html.push_str(&format!("<li>{}</li>\n", escape_content(text)));
            },
            Line::Quote(text) => {
                html.push_str(&format!(
                    "<blockquote>{}</blockquote>\n",
                    escape_content(text)
                ));
            },
            Line::Text("") => html.push_str("<br />\n"),
            Line::Text(text) => {
                html.push_str(&format!("<p>{}</p>\n", escape_content(text)));
            },
            Line::PreformatToggle { alt_text } => {
                if in_pre {
                    if html.ends_with('\n') {
                        html.pop();
                    }
                    html.push_str("</code></pre>\n");
                } else {
                    let alt = escape_attribute(alt_text);
                    html.push_str(&format!(
                        "<pre aria-label=\"{}\" title=\"{}\"><code>",
                        alt, alt
                    ));
                }
                in_pre = !in_pre;
            },
            Line::Preformatted(text) => {
                html.push_str(&escape_content(text));
                html.push('\n');
            },
            Line::Link { path, text } => push_link(&mut html, path, text),
        }
    }

    if in_pre {
        if html.ends_with('\n') {
            html.pop();
        }
        html.push_str("</code></pre>\n");
    }
    html.push_str("</div>");
    RenderedPage {
        html,
        title: title.unwrap_or_else(|| default_title.to_string()),
    }
}

fn push_link(html: &mut String, path: &str, text: &str) {
    let (scheme, has_host) = match Url::parse(path) {
        Ok(url) => (url.scheme().to_string(), url.host_str().is_some()),
        Err(_) => (String::new(), false),
    };
    let gemini_note = if scheme == "gemini" {
        " [Gemini Protocol Link]"
    } else {
        ""
    };
    let target = if has_host { " target=\"_blank\"" } else { "" };

    if scheme.is_empty() && mime_for_path(path).starts_with("image/") {
        let alt = escape_attribute(text);
        html.push_str(&format!(
            "<div class=\"img-container\"><img src=\"{}\" alt=\"{}\" title=\"{}\"/></div>\n",
            escape_attribute(path),
            alt,
            alt
        ));
        return;
    }

    let href = escape_attribute(path);
    let label = if text.is_empty() {
        href.clone()
    } else {
        escape_attribute(text)
    };
    html.push_str(&format!(
        "<a href=\"{}\"{}>{}</a>{}<br />\n",
        href, target, label, gemini_note
    ));
}
