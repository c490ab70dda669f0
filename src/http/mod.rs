//! HTTP gateway
//!
//! Re-presents the capsule over plain HTTP/1.1. Gemtext pages are rendered
//! into the configured HTML layout; other files are served as-is.

use crate::config::Config;
use crate::content::{clean_path, mime_for_path, normalize_path, ContentResolver, FEED_MIME};
use crate::gemtext::render_html;
use crate::util::BoundListener;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Onion virtual port for the gateway unless configured
pub const DEFAULT_PORT: u16 = 80;

/// Limit on receiving a request's headers
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(5);

const TITLE_PLACEHOLDER: &str = "%TITLE%";
const CONTENT_PLACEHOLDER: &str = "%GEMINI_CONTENT%";
const PAGE_EXTENSIONS: &[&str] = &["gmi", "gemini", "html"];
const HTML_MIME: &str = "text/html; charset=utf-8";

/// Page renderer and file server behind the HTTP listener
#[derive(Debug, Clone)]
pub struct HttpGateway {
    resolver: ContentResolver,
    data_path: PathBuf,
    layout: String,
    default_title: String,
}

impl HttpGateway {
    pub fn new(
        resolver: ContentResolver,
        data_path: impl Into<PathBuf>,
        layout: impl Into<String>,
        default_title: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            data_path: data_path.into(),
            layout: layout.into(),
            default_title: default_title.into(),
        }
    }

    /// Build from config, reading the layout file once
    pub fn from_config(config: &Config) -> Result<Self> {
        let layout_path = &config.http.layout_html_path;
        let layout = std::fs::read_to_string(layout_path)
            .with_context(|| format!("Unable to read HTML layout {:?}", layout_path))?;
        if !layout.contains(CONTENT_PLACEHOLDER) {
            warn!(
                "HTML layout {:?} has no {} line, pages will render empty",
                layout_path, CONTENT_PLACEHOLDER
            );
        }
        Ok(Self::new(
            ContentResolver::from_config(config),
            &config.http.data_path,
            layout,
            &config.http.default_page_title,
        ))
    }

    /// Serve connections from `listener` until the task is dropped
    pub async fn run(self, listener: BoundListener) -> Result<()> {
        info!("HTTP gateway listening on {}", listener.describe());
        let gateway = Arc::new(self);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("HTTP accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                },
            };
            let io = TokioIo::new(stream);
            let gateway = Arc::clone(&gateway);

            tokio::spawn(async move {
                let service = service_fn(|req| {
                    let gateway = Arc::clone(&gateway);
                    async move { Ok::<_, Infallible>(gateway.handle(req).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(HEADER_READ_TIMEOUT)
                    .serve_connection(io, service)
                    .await
                {
                    debug!("HTTP connection error from {}: {}", peer, e);
                }
            });
        }
    }

    /// Answer one request
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }

        let host = req
            .headers()
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| req.uri().authority().map(|a| a.as_str()))
            .unwrap_or("localhost")
            .to_string();

        let Some(path) = clean_path(req.uri().path()) else {
            debug!("400 {} {}", host, req.uri().path());
            return error_response(StatusCode::BAD_REQUEST, "Bad Request");
        };

        let response = self.respond(&host, &path).await;
        debug!("{} {} {}", response.status().as_u16(), host, path);
        response
    }

    async fn respond(&self, host: &str, path: &str) -> Response<Full<Bytes>> {
        let page = normalize_path(path, PAGE_EXTENSIONS);

        if page.extension.is_some() {
            return self.serve_file(&page.path).await;
        }

        if self.resolver.is_feed(&page.path) {
            let feed = self.resolver.feed(&format!("http://{}", host)).await;
            return ok_response(FEED_MIME, feed.into_bytes());
        }

        match self.resolver.gemtext(&page.path).await {
            Some(document) => {
                let html = self.render_page(&document);
                ok_response(HTML_MIME, html.into_bytes())
            },
            None => error_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// Gemtext document inside the layout
    pub fn render_page(&self, document: &str) -> String {
        let page = render_html(document, &self.default_title);
        let mut html = String::with_capacity(self.layout.len() + page.html.len());
        for line in self.layout.lines() {
            if line.contains(CONTENT_PLACEHOLDER) {
                html.push_str(&page.html);
            } else {
                html.push_str(&line.replace(TITLE_PLACEHOLDER, &page.title));
            }
            html.push('\n');
        }
        html
    }

    async fn serve_file(&self, path: &str) -> Response<Full<Bytes>> {
        let roots = [self.resolver.data_path(), self.data_path.as_path()];
        for root in roots {
            if let Some(body) = read_file(root, path).await {
                return ok_response(mime_for_path(path), body);
            }
        }
        error_response(StatusCode::NOT_FOUND, "Not Found")
    }
}

async fn read_file(root: &Path, path: &str) -> Option<Vec<u8>> {
    let local = root.join(path.trim_start_matches('/'));
    let meta = tokio::fs::metadata(&local).await.ok()?;
    if !meta.is_file() {
        return None;
    }
    tokio::fs::read(&local).await.ok()
}

fn ok_response(mime: &str, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, mime)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
}

/// Create an error response
fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LAYOUT: &str = "<html><head><title>%TITLE%</title></head><body>\n    %GEMINI_CONTENT%\n</body></html>\n";

    struct Site {
        _gemini: tempfile::TempDir,
        _http: tempfile::TempDir,
        gateway: HttpGateway,
    }

    fn site(feed: bool) -> Site {
        let gemini = tempfile::tempdir().unwrap();
        let http = tempfile::tempdir().unwrap();
        std::fs::write(gemini.path().join("index.gmi"), "# Home\nhello\n").unwrap();
        std::fs::write(
            gemini.path().join("blog.gmi"),
            "# Blog\n=> /posts/a.gmi 2024-01-02 - First\n",
        )
        .unwrap();
        std::fs::write(gemini.path().join("shared.txt"), "from gemini").unwrap();
        std::fs::write(http.path().join("shared.txt"), "from http").unwrap();
        std::fs::write(http.path().join("style.css"), "body {}").unwrap();

        let resolver = ContentResolver::new(gemini.path(), feed.then(|| "blog".to_string()));
        let gateway = HttpGateway::new(resolver, http.path(), LAYOUT, "Capsule");
        Site {
            _gemini: gemini,
            _http: http,
            gateway,
        }
    }

    async fn get(gateway: &HttpGateway, uri: &str) -> (StatusCode, String, String) {
        let req = Request::builder()
            .uri(uri)
            .header(HOST, "example.org")
            .body(())
            .unwrap();
        let response = gateway.handle(req).await;
        let status = response.status();
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, mime, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn test_layout_substitution() {
        let site = site(false);
        let html = site.gateway.render_page("# Hi\ntext");
        assert_eq!(
            html,
            "<html><head><title>Hi</title></head><body>\n\
             <div id=\"content\">\n<h1>Hi</h1>\n<p>text</p>\n</div>\n\
             </body></html>\n"
        );
        assert!(site.gateway.render_page("no heading").contains("<title>Capsule</title>"));
    }

    #[tokio::test]
    async fn test_pages() {
        let site = site(false);
        for uri in ["/", "/index", "/index.gmi", "/index.html"] {
            let (status, mime, body) = get(&site.gateway, uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(mime, HTML_MIME);
            assert!(body.contains("<h1>Home</h1>"));
        }
        let (status, _, _) = get(&site.gateway, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_files_prefer_gemini_root() {
        let site = site(false);
        let (status, mime, body) = get(&site.gateway, "/shared.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mime, "text/plain; charset=utf-8");
        assert_eq!(body, "from gemini");

        let (_, mime, body) = get(&site.gateway, "/style.css").await;
        assert_eq!(mime, "text/css; charset=utf-8");
        assert_eq!(body, "body {}");

        let (status, _, _) = get(&site.gateway, "/nope.png").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_escape_refused() {
        let site = site(false);
        let (status, _, _) = get(&site.gateway, "/../secret.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = get(&site.gateway, "/%2e%2e/secret.txt").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_feed_uses_http_origin() {
        let (status, _, _) = get(&site(false).gateway, "/feed").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let site = site(true);
        let (status, mime, body) = get(&site.gateway, "/rss").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mime, FEED_MIME);
        assert!(body.contains("http://example.org/posts/a.gmi"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let site = site(false);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(())
            .unwrap();
        let response = site.gateway.handle(req).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let site = site(false);
        let listener = BoundListener::bind(&crate::util::Location::parse("127.0.0.1:0"))
            .await
            .unwrap();
        let port = listener.local_port().unwrap();
        let server = tokio::spawn(site.gateway.clone().run(listener));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: example.org\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("<h1>Home</h1>"));

        server.abort();
    }
}
