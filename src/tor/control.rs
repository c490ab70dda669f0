//! Tor Control Port client
//!
//! SAFECOOKIE authentication and onion service provisioning. Commands are
//! written by the caller while a background task scans replies and hands
//! each awaited value over a oneshot channel.

use crate::crypto::HiddenServiceKey;
use crate::util::{Location, Protocol};
use anyhow::{anyhow, bail, Context, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// HMAC key for the hash the controller sends
pub const CONTROLLER_TO_SERVER_KEY: &[u8] =
    b"Tor safe cookie authentication controller-to-server hash";

/// HMAC key for the hash Tor sends back in AUTHCHALLENGE
pub const SERVER_TO_CONTROLLER_KEY: &[u8] =
    b"Tor safe cookie authentication server-to-controller hash";

/// Attempts at reading the control port file before using the default
pub const CONTROL_PORT_FILE_ATTEMPTS: u32 = 20;

/// Delay between control port file attempts
pub const CONTROL_PORT_FILE_BACKOFF: Duration = Duration::from_millis(100);

/// Progress of one control-port conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    ChallengeSent,
    ServerNonceReceived,
    Authenticated,
    OnionRequested,
    Ready,
}

/// Parsed `250 AUTHCHALLENGE` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub server_nonce: Vec<u8>,
    pub server_hash: Option<Vec<u8>>,
}

/// One `Port=<virtual>,<target>` clause of ADD_ONION
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnionPort {
    pub virtual_port: u16,
    pub target: String,
}

impl OnionPort {
    /// Map a listening location to a target Tor can dial
    pub fn for_listener(virtual_port: u16, listening_location: &str) -> Self {
        let location = Location::parse(listening_location);
        let target = match location.protocol {
            Protocol::Unix => format!("unix:{}", location.address),
            Protocol::Tcp | Protocol::Udp => {
                let address = location.address;
                if let Some(port) = address.strip_prefix(':') {
                    format!("127.0.0.1:{}", port)
                } else if let Some(port) = address.strip_prefix("0.0.0.0:") {
                    format!("127.0.0.1:{}", port)
                } else if let Some(port) = address.strip_prefix("[::]:") {
                    format!("[::1]:{}", port)
                } else {
                    address
                }
            },
        };
        Self {
            virtual_port,
            target,
        }
    }
}

/// Where the control port listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAddress {
    Tcp(String),
    Unix(PathBuf),
}

impl std::fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{}", addr),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Parse the file written by `ControlPortWriteToFile`
///
/// First `PORT=` or `UNIX_PORT=` line wins.
pub fn parse_control_port_file(contents: &str) -> Option<ControlAddress> {
    contents.lines().map(str::trim).find_map(|line| {
        if let Some(path) = line.strip_prefix("UNIX_PORT=") {
            Some(ControlAddress::Unix(PathBuf::from(path)))
        } else {
            line.strip_prefix("PORT=")
                .map(|addr| ControlAddress::Tcp(addr.to_string()))
        }
    })
}

/// Poll the control port file briefly, then fall back to `default`
pub async fn resolve_control_address(path: &Path, default: &str) -> ControlAddress {
    for attempt in 1..=CONTROL_PORT_FILE_ATTEMPTS {
        if let Ok(contents) = tokio::fs::read_to_string(path).await {
            if let Some(address) = parse_control_port_file(&contents) {
                debug!("Control port {} read from {:?}", address, path);
                return address;
            }
        }
        debug!(
            "Control port file {:?} not ready (attempt {}/{})",
            path, attempt, CONTROL_PORT_FILE_ATTEMPTS
        );
        tokio::time::sleep(CONTROL_PORT_FILE_BACKOFF).await;
    }

    warn!(
        "No usable control port file at {:?}, using {}",
        path, default
    );
    ControlAddress::Tcp(default.to_string())
}

/// `HMAC-SHA256(key, cookie || client_nonce || server_nonce)`
fn safecookie_mac(
    key: &[u8],
    cookie: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> Result<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| anyhow!("SAFECOOKIE HMAC key: {}", e))?;
    mac.update(cookie);
    mac.update(client_nonce);
    mac.update(server_nonce);
    Ok(mac)
}

fn finalize(mac: HmacSha256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Hash sent in `AUTHENTICATE`
pub fn safecookie_client_hash(
    cookie: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> Result<[u8; 32]> {
    let mac = safecookie_mac(CONTROLLER_TO_SERVER_KEY, cookie, client_nonce, server_nonce)?;
    Ok(finalize(mac))
}

/// Hash Tor proves cookie knowledge with
pub fn safecookie_server_hash(
    cookie: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
) -> Result<[u8; 32]> {
    let mac = safecookie_mac(SERVER_TO_CONTROLLER_KEY, cookie, client_nonce, server_nonce)?;
    Ok(finalize(mac))
}

/// Constant-time check of Tor's SERVERHASH
pub fn verify_server_hash(
    cookie: &[u8],
    client_nonce: &[u8],
    server_nonce: &[u8],
    server_hash: &[u8],
) -> Result<bool> {
    let mac = safecookie_mac(SERVER_TO_CONTROLLER_KEY, cookie, client_nonce, server_nonce)?;
    Ok(mac.verify_slice(server_hash).is_ok())
}

/// Build the ADD_ONION command line
pub fn add_onion_command(key: &HiddenServiceKey, ports: &[OnionPort]) -> String {
    let mut cmd = format!(
        "ADD_ONION ED25519-V3:{} Flags=DiscardPK,Detach",
        key.to_base64()
    );
    for port in ports {
        cmd.push_str(&format!(" Port={},{}", port.virtual_port, port.target));
    }
    cmd.push_str("\r\n");
    cmd
}

/// Value of `NAME=<hex>` among the reply's space-separated fields
fn hex_field(line: &str, name: &str) -> Result<Option<Vec<u8>>> {
    let prefix = format!("{}=", name);
    let Some(value) = line
        .split_whitespace()
        .find_map(|field| field.strip_prefix(prefix.as_str()))
    else {
        return Ok(None);
    };
    let bytes = hex::decode(value).with_context(|| format!("Invalid {} in reply", name))?;
    Ok(Some(bytes))
}

/// Parse `250 AUTHCHALLENGE SERVERHASH=<hex> SERVERNONCE=<hex>`
pub fn parse_auth_challenge(line: &str) -> Result<AuthChallenge> {
    let server_nonce = hex_field(line, "SERVERNONCE")?.context("No SERVERNONCE in reply")?;
    let server_hash = hex_field(line, "SERVERHASH")?;
    Ok(AuthChallenge {
        server_nonce,
        server_hash,
    })
}

/// Base32 service ID from a `250-ServiceID=` line
pub fn parse_service_id(line: &str) -> Option<String> {
    let (_, rest) = line.split_once("ServiceID=")?;
    let id: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic() || ('2'..='7').contains(c))
        .collect();
    if id.is_empty() {
        None
    } else {
        Some(id.to_lowercase())
    }
}

/// `5xx` status line
fn is_error_reply(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 3 && bytes[0] == b'5' && bytes[1..3].iter().all(u8::is_ascii_digit)
}

/// Background task: scan replies and fulfil the pending waits
///
/// An error reply fails whichever wait is still pending. EOF drops both
/// senders so the writer sees the connection close.
async fn read_replies<R>(
    reader: R,
    nonce_tx: oneshot::Sender<Result<AuthChallenge>>,
    service_tx: oneshot::Sender<Result<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut nonce_tx = Some(nonce_tx);
    let mut service_tx = Some(service_tx);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Tor control connection closed");
                return;
            },
            Err(e) => {
                debug!("Tor control read failed: {}", e);
                return;
            },
        };
        debug!("Tor control reply: {}", line);

        if is_error_reply(&line) {
            let err = anyhow!("Tor control error: {}", line.trim());
            if let Some(tx) = nonce_tx.take() {
                let _ = tx.send(Err(err));
            } else if let Some(tx) = service_tx.take() {
                let _ = tx.send(Err(err));
            }
            return;
        }

        if line.contains("SERVERNONCE=") {
            if let Some(tx) = nonce_tx.take() {
                let _ = tx.send(parse_auth_challenge(&line));
            }
        } else if line.contains("ServiceID=") {
            if let Some(id) = parse_service_id(&line) {
                if let Some(tx) = service_tx.take() {
                    let _ = tx.send(Ok(format!("{}.onion", id)));
                }
                return;
            }
        }
    }
}

/// Wait for the reader's handoff, bounded by `limit`
async fn wait_for<T>(
    rx: oneshot::Receiver<Result<T>>,
    limit: Duration,
    what: &str,
) -> Result<T> {
    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => bail!("Tor control connection closed while waiting for {}", what),
        Err(_) => bail!("Timed out after {:?} waiting for {}", limit, what),
    }
}

/// One control-port session
pub struct TorController {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    state: SessionState,
    client_nonce: [u8; 32],
    reply_timeout: Duration,
    nonce_rx: Option<oneshot::Receiver<Result<AuthChallenge>>>,
    service_rx: Option<oneshot::Receiver<Result<String>>>,
    reader: JoinHandle<()>,
}

impl TorController {
    /// Dial the control port
    pub async fn connect(address: &ControlAddress, reply_timeout: Duration) -> Result<Self> {
        debug!("Connecting to Tor control port: {}", address);
        match address {
            ControlAddress::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("Failed to connect to Tor at {}", addr))?;
                Ok(Self::from_stream(stream, reply_timeout))
            },
            #[cfg(unix)]
            ControlAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .with_context(|| format!("Failed to connect to Tor at {:?}", path))?;
                Ok(Self::from_stream(stream, reply_timeout))
            },
            #[cfg(not(unix))]
            ControlAddress::Unix(path) => {
                bail!("Unix control sockets are not supported here: {:?}", path)
            },
        }
    }

    /// Wrap an established stream and start the reply reader
    pub fn from_stream<S>(stream: S, reply_timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (nonce_tx, nonce_rx) = oneshot::channel();
        let (service_tx, service_rx) = oneshot::channel();
        let reader = tokio::spawn(read_replies(read_half, nonce_tx, service_tx));

        Self {
            writer: Box::new(write_half),
            state: SessionState::Disconnected,
            client_nonce: crate::util::rand::random_bytes(),
            reply_timeout,
            nonce_rx: Some(nonce_rx),
            service_rx: Some(service_rx),
            reader,
        }
    }

    /// Use a fixed client nonce instead of a random one
    pub fn with_client_nonce(mut self, nonce: [u8; 32]) -> Self {
        self.client_nonce = nonce;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    async fn send_command(&mut self, cmd: &str) -> Result<()> {
        let verb = cmd.split_whitespace().next().unwrap_or_default();
        debug!("Sending Tor command: {}", verb);
        self.writer
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("Failed to send {} to Tor", verb))?;
        self.writer.flush().await?;
        Ok(())
    }

    /// SAFECOOKIE handshake using the cookie at `cookie_path`
    pub async fn authenticate(&mut self, cookie_path: &Path) -> Result<()> {
        if self.state != SessionState::Disconnected {
            bail!("Authentication already attempted ({:?})", self.state);
        }
        let nonce_rx = self
            .nonce_rx
            .take()
            .context("AUTHCHALLENGE reply already consumed")?;

        let cmd = format!(
            "AUTHCHALLENGE SAFECOOKIE {}\r\n",
            hex::encode(self.client_nonce)
        );
        self.send_command(&cmd).await?;
        self.state = SessionState::ChallengeSent;

        let challenge = wait_for(nonce_rx, self.reply_timeout, "SERVERNONCE").await?;
        self.state = SessionState::ServerNonceReceived;

        let cookie = std::fs::read(cookie_path)
            .with_context(|| format!("Unable to read Tor auth cookie: {:?}", cookie_path))?;

        if let Some(server_hash) = &challenge.server_hash {
            let valid = verify_server_hash(
                &cookie,
                &self.client_nonce,
                &challenge.server_nonce,
                server_hash,
            )?;
            if !valid {
                bail!("Tor SERVERHASH does not match the auth cookie");
            }
        }

        let client_hash =
            safecookie_client_hash(&cookie, &self.client_nonce, &challenge.server_nonce)?;
        self.send_command(&format!("AUTHENTICATE {}\r\n", hex::encode(client_hash)))
            .await?;
        self.state = SessionState::Authenticated;
        debug!("Sent SAFECOOKIE authentication");
        Ok(())
    }

    /// Publish the onion service and return its address
    pub async fn add_onion(&mut self, key: &HiddenServiceKey, ports: &[OnionPort]) -> Result<String> {
        if self.state != SessionState::Authenticated {
            bail!("ADD_ONION before authentication ({:?})", self.state);
        }
        let service_rx = self
            .service_rx
            .take()
            .context("ServiceID reply already consumed")?;

        self.send_command(&add_onion_command(key, ports)).await?;
        self.state = SessionState::OnionRequested;

        let address = wait_for(service_rx, self.reply_timeout, "ServiceID").await?;
        self.state = SessionState::Ready;
        info!("Onion service published: {}", address);
        Ok(address)
    }
}

impl Drop for TorController {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
