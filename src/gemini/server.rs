//! Gemini TLS listener
//!
//! One task per connection. Each connection gets a single read, treated as
//! the whole request, and is closed after the response.

use super::request::{parse_request, GeminiRequest, Outcome};
use super::{Status, VirtualHostTable, READ_BUFFER_LEN, READ_TIMEOUT};
use crate::content::{Content, ContentResolver};
use crate::util::BoundListener;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Read-only state shared by every connection
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub hosts: VirtualHostTable,
    pub resolver: ContentResolver,
}

/// Bound Gemini listener with its TLS configuration
pub struct GeminiServer {
    listener: BoundListener,
    acceptor: TlsAcceptor,
    ctx: Arc<ServerContext>,
}

impl GeminiServer {
    pub fn new(listener: BoundListener, tls: rustls::ServerConfig, ctx: ServerContext) -> Self {
        Self {
            listener,
            acceptor: TlsAcceptor::from(Arc::new(tls)),
            ctx: Arc::new(ctx),
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_port()
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Gemini capsule listening on {}", self.listener.describe());

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Gemini accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                },
            };

            let acceptor = self.acceptor.clone();
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                if let Err(e) = serve_tls(&acceptor, stream, &ctx).await {
                    debug!("Gemini connection from {}: {:#}", peer, e);
                }
            });
        }
    }
}

/// TLS handshake and request handling under one read deadline
pub async fn serve_tls<S>(acceptor: &TlsAcceptor, stream: S, ctx: &ServerContext) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + READ_TIMEOUT;
    let tls = timeout_at(deadline, acceptor.accept(stream))
        .await
        .context("TLS handshake timed out")?
        .context("TLS handshake failed")?;
    handle_connection(tls, ctx, deadline).await
}

/// Read one request and answer it
pub async fn handle_connection<S>(mut stream: S, ctx: &ServerContext, deadline: Instant) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_LEN];
    let n = match timeout_at(deadline, stream.read(&mut buf)).await {
        Ok(read) => read.context("Request read failed")?,
        Err(_) => {
            debug!("Request read timed out");
            return Ok(());
        },
    };
    if n == 0 {
        return Ok(());
    }

    match parse_request(&buf[..n], &ctx.hosts) {
        Outcome::Drop => debug!("Dropped malformed request ({} bytes)", n),
        Outcome::Respond(status, meta) => {
            debug!("Rejected request: {} {}", status, meta);
            stream.write_all(status.header(meta).as_bytes()).await?;
        },
        Outcome::Dispatch(request) => respond(&mut stream, &ctx.resolver, &request).await?,
    }

    let _ = stream.shutdown().await;
    Ok(())
}

async fn respond<S>(stream: &mut S, resolver: &ContentResolver, request: &GeminiRequest) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match resolver.resolve(&request.path, &request.origin()).await {
        Content::Bytes { mime, body } => {
            debug!("20 {} {}", request.host, request.path);
            stream.write_all(Status::Success.header(&mime).as_bytes()).await?;
            stream.write_all(&body).await?;
        },
        Content::File { mime, mut file } => {
            debug!("20 {} {}", request.host, request.path);
            stream.write_all(Status::Success.header(&mime).as_bytes()).await?;
            tokio::io::copy(&mut file, stream).await?;
        },
        Content::NotFound => {
            debug!("51 {} {}", request.host, request.path);
            stream
                .write_all(Status::NotFound.header("Page Not Found").as_bytes())
                .await?;
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule() -> (tempfile::TempDir, ServerContext) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.gmi"), "# Welcome\n=> /about About\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain notes").unwrap();

        let mut hosts = VirtualHostTable::new();
        hosts.insert("example.org", 1965);
        let ctx = ServerContext {
            hosts,
            resolver: ContentResolver::new(dir.path().join("."), None),
        };
        (dir, ctx)
    }

    async fn exchange(ctx: &ServerContext, request: &[u8]) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(8192);
        client.write_all(request).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        handle_connection(server, ctx, deadline).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_index_served() {
        let (_dir, ctx) = capsule();
        let response = exchange(&ctx, b"gemini://example.org/\r\n").await;
        assert_eq!(
            response,
            b"20 text/gemini\r\n# Welcome\n=> /about About\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_wrong_host() {
        let (_dir, ctx) = capsule();
        let response = exchange(&ctx, b"gemini://wrong.org/\r\n").await;
        assert_eq!(response, b"53 Invalid Host\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_oversized_request() {
        let (_dir, ctx) = capsule();
        let request = format!("gemini://example.org/{}\r\n", "x".repeat(1100));
        let response = exchange(&ctx, request.as_bytes()).await;
        assert_eq!(response, b"59 Invalid Request\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_not_found() {
        let (_dir, ctx) = capsule();
        let response = exchange(&ctx, b"gemini://example.org/missing\r\n").await;
        assert_eq!(response, b"51 Page Not Found\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_file_with_mime() {
        let (_dir, ctx) = capsule();
        let response = exchange(&ctx, b"gemini://example.org/notes.txt\r\n").await;
        assert_eq!(
            response,
            b"20 text/plain; charset=utf-8\r\nplain notes".to_vec()
        );
    }

    #[tokio::test]
    async fn test_escape_never_reads_outside_root() {
        let (_dir, ctx) = capsule();
        let response = exchange(&ctx, b"gemini://example.org/../etc/passwd\r\n").await;
        assert_eq!(response, b"59 Invalid Request\r\n".to_vec());
    }

    #[tokio::test]
    async fn test_unterminated_request_gets_nothing() {
        let (_dir, ctx) = capsule();
        assert!(exchange(&ctx, b"gemini://example.org/").await.is_empty());
        assert!(exchange(&ctx, b"gemini://example.org/\r\n\r\n").await.is_empty());
    }

    #[tokio::test]
    async fn test_never_success_without_single_trailing_crlf() {
        let (_dir, ctx) = capsule();
        let cases: &[&[u8]] = &[
            b"gemini://example.org/\n",
            b"gemini://example.org/\r",
            b"gemini://example.org/\r\nx",
            b"gemini://example.org/\r\ngemini://example.org/\r\n",
            b"\xfe\xffgemini://example.org/",
            b"\xfe\xffgemini://example.org/\r\n",
        ];
        for case in cases {
            let response = exchange(&ctx, case).await;
            assert!(
                response.is_empty() || response.starts_with(b"59 "),
                "{:?} -> {:?}",
                String::from_utf8_lossy(case),
                String::from_utf8_lossy(&response)
            );
        }
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let (_dir, ctx) = capsule();
        let (mut client, server) = tokio::io::duplex(1024);
        let deadline = Instant::now() + Duration::from_millis(50);
        handle_connection(server, &ctx, deadline).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
    }
}
