//! TLS termination
//!
//! Certificate lifecycle and the rustls server configuration built on it.

pub mod cert;
pub mod config;

pub use cert::{CertificateManager, CertificateOrigin, KeyKind, TlsCertificate};
pub use config::build_server_tls_config;
