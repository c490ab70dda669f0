//! Configuration loading and validation
//!
//! Handles TOML configuration parsing with strict validation.
//! No runtime mutation - configuration is immutable after load.

pub mod file;
mod validation;

pub use file::{load_from_path, save_to_path};
pub use validation::validate;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default config file, relative to the working directory
pub const CONFIG_FILE_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rss: RssConfig,
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Feed generated from a gemtext index page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Gemtext page (relative to the Gemini data path) the feed is built from
    #[serde(default = "default_feed_source")]
    pub feed_source_gemini_path: String,
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_source_gemini_path: default_feed_source(),
        }
    }
}

fn default_feed_source() -> String {
    "blog".to_string()
}

/// Tor daemon and onion service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Launch `tor -f <torrc_path>` ourselves instead of using a running daemon
    #[serde(default = "default_true")]
    pub manage_daemon: bool,
    /// Tor executable started when `manage_daemon` is set
    #[serde(default = "default_tor_binary")]
    pub binary_path: PathBuf,
    #[serde(default = "default_torrc")]
    pub torrc_path: PathBuf,
    /// File Tor writes its control port into (`ControlPortWriteToFile`)
    #[serde(default = "default_control_port_file")]
    pub control_port_file_path: PathBuf,
    #[serde(default = "default_cookie")]
    pub control_auth_cookie_path: PathBuf,
    #[serde(default = "default_hs_key")]
    pub hidden_service_private_key_path: PathBuf,
    /// Used when the control port file never shows up
    #[serde(default = "default_control_address")]
    pub default_control_address: String,
    /// Upper bound on each wait for a control-port reply
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            manage_daemon: true,
            binary_path: default_tor_binary(),
            torrc_path: default_torrc(),
            control_port_file_path: default_control_port_file(),
            control_auth_cookie_path: default_cookie(),
            hidden_service_private_key_path: default_hs_key(),
            default_control_address: default_control_address(),
            reply_timeout_secs: default_reply_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_tor_binary() -> PathBuf {
    PathBuf::from("tor")
}
fn default_torrc() -> PathBuf {
    PathBuf::from("tor/torrc")
}
fn default_control_port_file() -> PathBuf {
    PathBuf::from("tor/control_port")
}
fn default_cookie() -> PathBuf {
    PathBuf::from("tor/control_auth_cookie")
}
fn default_hs_key() -> PathBuf {
    PathBuf::from("tor/hs_ed25519_secret_key")
}
fn default_control_address() -> String {
    "127.0.0.1:9051".to_string()
}
fn default_reply_timeout() -> u64 {
    60
}

/// Gemini capsule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Host names the capsule answers to (`localhost` when empty)
    #[serde(default)]
    pub domain_names: Vec<String>,
    #[serde(default = "default_gemini_data")]
    pub data_path: PathBuf,
    #[serde(default = "default_gemini_location")]
    pub listening_location: String,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default = "default_gemini_tor")]
    pub tor: VirtualPortConfig,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            domain_names: Vec::new(),
            data_path: default_gemini_data(),
            listening_location: default_gemini_location(),
            tls: TlsConfig::default(),
            tor: default_gemini_tor(),
        }
    }
}

fn default_gemini_data() -> PathBuf {
    PathBuf::from("gemini")
}
fn default_gemini_location() -> String {
    "127.0.0.1:1965".to_string()
}
fn default_gemini_tor() -> VirtualPortConfig {
    VirtualPortConfig {
        virtual_port: crate::gemini::DEFAULT_PORT,
    }
}

/// Serving certificate and key locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("tls/cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("tls/cert.key")
}

/// Port a service is published on inside the onion service
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VirtualPortConfig {
    pub virtual_port: u16,
}

/// HTTP gateway re-presenting the capsule as HTML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_location")]
    pub listening_location: String,
    #[serde(default = "default_http_data")]
    pub data_path: PathBuf,
    #[serde(default = "default_layout")]
    pub layout_html_path: PathBuf,
    #[serde(default)]
    pub default_page_title: String,
    #[serde(default = "default_http_tor")]
    pub tor: VirtualPortConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listening_location: default_http_location(),
            data_path: default_http_data(),
            layout_html_path: default_layout(),
            default_page_title: String::new(),
            tor: default_http_tor(),
        }
    }
}

fn default_http_location() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_http_data() -> PathBuf {
    PathBuf::from("http")
}
fn default_layout() -> PathBuf {
    PathBuf::from("http/layout.html")
}
fn default_http_tor() -> VirtualPortConfig {
    VirtualPortConfig {
        virtual_port: crate::http::DEFAULT_PORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.tor.enabled);
        assert_eq!(config.gemini.listening_location, "127.0.0.1:1965");
        assert_eq!(config.gemini.tor.virtual_port, 1965);
        assert_eq!(config.http.tor.virtual_port, 80);
        assert_eq!(
            config.tor.hidden_service_private_key_path,
            PathBuf::from("tor/hs_ed25519_secret_key")
        );
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [tor]
            enabled = true

            [gemini]
            domain_names = ["example.org"]

            [gemini.tor]
            virtual_port = 1966
            "#,
        )
        .unwrap();
        assert!(config.tor.enabled);
        assert!(config.tor.manage_daemon);
        assert_eq!(config.tor.binary_path, PathBuf::from("tor"));
        assert_eq!(config.gemini.domain_names, vec!["example.org"]);
        assert_eq!(config.gemini.tor.virtual_port, 1966);
        assert_eq!(config.gemini.tls.cert_path, PathBuf::from("tls/cert.pem"));
    }
}
