//! Extension to MIME type table

/// Fallback for unknown or missing extensions
pub const DEFAULT_MIME: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("gmi", "text/gemini"),
    ("gemini", "text/gemini"),
    ("txt", "text/plain; charset=utf-8"),
    ("md", "text/markdown; charset=utf-8"),
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("xml", "text/xml; charset=utf-8"),
    ("rss", "application/rss+xml"),
    ("atom", "application/atom+xml"),
    ("pdf", "application/pdf"),
    ("wasm", "application/wasm"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/vnd.microsoft.icon"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("flac", "audio/flac"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
];

/// Extension of the last path segment, without the dot
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext)
}

/// MIME type for a path by its extension
pub fn mime_for_path(path: &str) -> &'static str {
    let Some(ext) = extension(path) else {
        return DEFAULT_MIME;
    };
    let ext = ext.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(mime_for_path("/images/cat.PNG"), "image/png");
        assert_eq!(mime_for_path("/index.gmi"), "text/gemini");
        assert_eq!(mime_for_path("style.css"), "text/css; charset=utf-8");
    }

    #[test]
    fn test_fallback() {
        assert_eq!(mime_for_path("/bin/blob.xyz"), DEFAULT_MIME);
        assert_eq!(mime_for_path("/dir.d/README"), DEFAULT_MIME);
    }
}
