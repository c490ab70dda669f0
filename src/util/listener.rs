//! Stream listeners bound from a location

use super::{Location, Protocol};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

/// Any accepted byte stream
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// TCP or unix-domain listener
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: PathBuf,
    },
}

impl BoundListener {
    /// Bind `location`; udp is refused, a stale unix socket path is unlinked
    pub async fn bind(location: &Location) -> Result<Self> {
        match location.protocol {
            Protocol::Tcp => {
                let address = location.bind_address();
                let listener = TcpListener::bind(&address)
                    .await
                    .with_context(|| format!("Failed to bind to {}", address))?;
                Ok(Self::Tcp(listener))
            },
            Protocol::Udp => bail!("Cannot listen on {}: udp is not a stream transport", location),
            #[cfg(unix)]
            Protocol::Unix => {
                let path = PathBuf::from(&location.address);
                match std::fs::remove_file(&path) {
                    Ok(()) => tracing::debug!("Removed stale socket {:?}", path),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                    Err(e) => {
                        return Err(e).with_context(|| format!("Unable to remove {:?}", path))
                    },
                }
                let listener = tokio::net::UnixListener::bind(&path)
                    .with_context(|| format!("Failed to bind to {:?}", path))?;
                Ok(Self::Unix { listener, path })
            },
            #[cfg(not(unix))]
            Protocol::Unix => bail!("Unix sockets are not supported on this platform"),
        }
    }

    /// Port actually bound, for TCP listeners
    pub fn local_port(&self) -> Option<u16> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok().map(|addr| addr.port()),
            #[cfg(unix)]
            Self::Unix { .. } => None,
        }
    }

    /// Human-readable bound address
    pub fn describe(&self) -> String {
        match self {
            Self::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp".to_string()),
            #[cfg(unix)]
            Self::Unix { path, .. } => format!("unix:{}", path.display()),
        }
    }

    /// Accept the next connection and a description of its peer
    pub async fn accept(&self) -> std::io::Result<(Box<dyn Connection>, String)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((Box::new(stream), addr.to_string()))
            },
            #[cfg(unix)]
            Self::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("unix:{}", path.display())))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_tcp_ephemeral_port() {
        let listener = BoundListener::bind(&Location::parse("127.0.0.1:0"))
            .await
            .unwrap();
        let port = listener.local_port().unwrap();
        assert_ne!(port, 0);

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .unwrap();
            stream.write_all(b"ping").await.unwrap();
        });
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_udp_rejected() {
        assert!(BoundListener::bind(&Location::parse("udp:127.0.0.1:0"))
            .await
            .is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_replaces_stale_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capsule.sock");
        std::fs::write(&path, b"stale").unwrap();

        let location = Location::parse(&format!("unix:{}", path.display()));
        let listener = BoundListener::bind(&location).await.unwrap();
        assert_eq!(listener.local_port(), None);
        assert!(listener.describe().starts_with("unix:"));
    }
}
