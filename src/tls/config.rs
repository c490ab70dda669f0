//! rustls server configuration for the Gemini listener

use super::TlsCertificate;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Build a `rustls::ServerConfig` around the managed certificate
///
/// Ring provider, default protocol versions, no client authentication.
pub fn build_server_tls_config(cert: &TlsCertificate) -> Result<rustls::ServerConfig> {
    let chain = rustls_pemfile::certs(&mut cert.cert_pem.as_bytes())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse TLS certificate PEM")?;
    let key = rustls_pemfile::private_key(&mut cert.key_pem.as_bytes())
        .context("Failed to parse TLS key PEM")?
        .context("No private key in TLS key PEM")?;

    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("TLS protocol version config")?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("TLS server certificate config")
}
