//! Content resolution under the capsule's data root
//!
//! Paths arriving here have already been cleaned, so they cannot leave the
//! data root.

pub mod mime;

pub use mime::{mime_for_path, DEFAULT_MIME};

use crate::config::Config;
use crate::gemtext::render_feed;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// MIME type of gemtext pages
pub const GEMTEXT_MIME: &str = "text/gemini";

/// MIME type served for the generated feed
pub const FEED_MIME: &str = "application/rss+xml";

/// Extensions tried, in order, for an extension-less page
pub const GEMTEXT_EXTENSIONS: &[&str] = &["gmi", "gemini"];

/// Percent-decode and resolve `.`/`..` segments against the root
///
/// Returns `None` when the path climbs above the root or is not UTF-8.
/// The result is `""` for the root itself, otherwise `/seg/...` with no
/// trailing slash.
pub fn clean_path(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop()?;
            },
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        Some(String::new())
    } else {
        Some(format!("/{}", segments.join("/")))
    }
}

/// Cleaned path with page extensions folded away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePath {
    /// `/index` for the root
    pub path: String,
    /// Remaining extension; `None` means a page lookup
    pub extension: Option<String>,
}

/// Strip a trailing slash and any of `page_extensions`, map the root to `/index`
pub fn normalize_path(path: &str, page_extensions: &[&str]) -> PagePath {
    let mut path = path.strip_suffix('/').unwrap_or(path).to_string();
    let mut extension = mime::extension(&path).map(str::to_string);

    if let Some(ext) = &extension {
        if page_extensions.contains(&ext.as_str()) {
            path.truncate(path.len() - ext.len() - 1);
            extension = None;
        }
    }
    if path.is_empty() {
        path = "/index".to_string();
    }
    PagePath { path, extension }
}

/// Resolved response body
#[derive(Debug)]
pub enum Content {
    /// In-memory body (pages and feeds)
    Bytes { mime: String, body: Vec<u8> },
    /// File to stream
    File {
        mime: String,
        file: tokio::fs::File,
    },
    NotFound,
}

/// Looks up pages, files and the feed under the Gemini data root
#[derive(Debug, Clone)]
pub struct ContentResolver {
    data_path: PathBuf,
    /// Feed source page, when feeds are enabled
    feed_source: Option<String>,
}

impl ContentResolver {
    pub fn new(data_path: impl Into<PathBuf>, feed_source: Option<String>) -> Self {
        Self {
            data_path: data_path.into(),
            feed_source,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let feed_source = config
            .rss
            .enabled
            .then(|| config.rss.feed_source_gemini_path.clone());
        Self::new(&config.gemini.data_path, feed_source)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Filesystem path for a cleaned request path
    pub fn local_path(&self, path: &str) -> PathBuf {
        self.data_path.join(path.trim_start_matches('/'))
    }

    /// `/feed` and `/rss` are the feed while feeds are enabled
    pub fn is_feed(&self, path: &str) -> bool {
        self.feed_source.is_some() && (path == "/feed" || path == "/rss")
    }

    /// Gemtext source of a page, trying each page extension
    pub async fn gemtext(&self, path: &str) -> Option<String> {
        let base = self.local_path(path);
        for ext in GEMTEXT_EXTENSIONS {
            let mut candidate = base.clone().into_os_string();
            candidate.push(".");
            candidate.push(ext);
            if let Ok(text) = tokio::fs::read_to_string(&candidate).await {
                return Some(text);
            }
        }
        None
    }

    /// Atom feed for `origin` (for example `gemini://host`), empty when
    /// the source page is missing or undated
    pub async fn feed(&self, origin: &str) -> String {
        let Some(source) = &self.feed_source else {
            return String::new();
        };
        match self.gemtext(&format!("/{}", source.trim_start_matches('/'))).await {
            Some(document) => render_feed(&document, origin, source),
            None => String::new(),
        }
    }

    /// Resolve a cleaned Gemini request path
    pub async fn resolve(&self, path: &str, origin: &str) -> Content {
        let page = normalize_path(path, GEMTEXT_EXTENSIONS);

        match page.extension {
            None if self.is_feed(&page.path) => Content::Bytes {
                mime: FEED_MIME.to_string(),
                body: self.feed(origin).await.into_bytes(),
            },
            None => match self.gemtext(&page.path).await {
                Some(text) => Content::Bytes {
                    mime: GEMTEXT_MIME.to_string(),
                    body: text.into_bytes(),
                },
                None => Content::NotFound,
            },
            Some(_) => self.open_file(&page.path).await,
        }
    }

    async fn open_file(&self, path: &str) -> Content {
        let local = self.local_path(path);
        match tokio::fs::File::open(&local).await {
            Ok(file) => match file.metadata().await {
                Ok(meta) if meta.is_file() => Content::File {
                    mime: mime_for_path(path).to_string(),
                    file,
                },
                _ => Content::NotFound,
            },
            Err(e) => {
                tracing::debug!("Unable to open {:?}: {}", local, e);
                Content::NotFound
            },
        }
    }
}
