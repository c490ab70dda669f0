//! Self-signed certificate lifecycle
//!
//! The serving certificate must name exactly the current DomainSet. On every
//! start the stored pair is checked and the certificate is reissued when the
//! names drift, keeping the existing private key. Clients pin the key
//! (TOFU), so the validity window is fixed and far in the future.

use crate::config::TlsConfig;
use crate::state::DomainSet;
use crate::util::fs::write_private;
use crate::util::rand::random_bytes;
use anyhow::{bail, Context, Result};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber, SignatureAlgorithm, PKCS_ECDSA_P256_SHA256,
    PKCS_ECDSA_P384_SHA384, PKCS_ED25519, PKCS_RSA_SHA256, PKCS_RSA_SHA384,
    PKCS_RSA_SHA512,
};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use x509_parser::prelude::*;

/// Private key families, which differ in the key usages they carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Ed25519,
    Ecdsa,
    Rsa,
}

impl KeyKind {
    /// Classify a key pair by its signature algorithm
    pub fn of(key: &KeyPair) -> Option<Self> {
        let alg: &SignatureAlgorithm = key.algorithm();
        if alg == &PKCS_ED25519 {
            Some(Self::Ed25519)
        } else if alg == &PKCS_ECDSA_P256_SHA256 || alg == &PKCS_ECDSA_P384_SHA384 {
            Some(Self::Ecdsa)
        } else if [&PKCS_RSA_SHA256, &PKCS_RSA_SHA384, &PKCS_RSA_SHA512].contains(&alg) {
            Some(Self::Rsa)
        } else {
            None
        }
    }

    /// Key usage bits for a certificate over this kind of key
    pub fn key_usages(self) -> Vec<KeyUsagePurpose> {
        let mut usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        // Only RSA keys can encipher keys
        if self == Self::Rsa {
            usages.push(KeyUsagePurpose::KeyEncipherment);
        }
        usages
    }
}

/// How the returned certificate came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateOrigin {
    /// Stored pair already matched the domain set
    Loaded,
    /// Certificate reissued over the stored key
    Reissued,
    /// Fresh key and certificate
    Generated,
}

/// PEM certificate and key ready for the TLS listener
#[derive(Clone)]
pub struct TlsCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub kind: KeyKind,
    pub origin: CertificateOrigin,
}

impl std::fmt::Debug for TlsCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCertificate")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Owns the certificate and key files
#[derive(Debug, Clone)]
pub struct CertificateManager {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl CertificateManager {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn from_config(config: &TlsConfig) -> Self {
        Self::new(&config.cert_path, &config.key_path)
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Return a certificate naming exactly `domains`
    ///
    /// Keeps a matching stored pair, reissues over a usable stored key, and
    /// otherwise generates an Ed25519 key. Only newly generated keys are
    /// written back.
    pub fn load_or_create(&self, domains: &DomainSet) -> Result<TlsCertificate> {
        let Some((key, kind, key_pem)) = self.load_key() else {
            let key = KeyPair::generate_for(&PKCS_ED25519)
                .context("Failed to generate certificate key")?;
            let cert_pem = issue(&key, KeyKind::Ed25519, domains)?;
            let key_pem = key.serialize_pem();

            write_private(&self.key_path, key_pem.as_bytes())
                .with_context(|| format!("Failed to write TLS key: {:?}", self.key_path))?;
            self.store_cert(&cert_pem)?;

            tracing::info!(
                "Generated ed25519 TLS certificate for {}",
                domains.as_slice().join(", ")
            );
            return Ok(TlsCertificate {
                cert_pem,
                key_pem,
                kind: KeyKind::Ed25519,
                origin: CertificateOrigin::Generated,
            });
        };

        if let Some((cert_pem, names)) = self.load_cert(&key) {
            if domains.same_members(&names) {
                tracing::info!("Loaded TLS certificate from {:?}", self.cert_path);
                return Ok(TlsCertificate {
                    cert_pem,
                    key_pem,
                    kind,
                    origin: CertificateOrigin::Loaded,
                });
            }
            tracing::info!(
                "TLS certificate names [{}] do not match [{}], reissuing",
                names.join(", "),
                domains.as_slice().join(", ")
            );
        }

        let cert_pem = issue(&key, kind, domains)?;
        self.store_cert(&cert_pem)?;
        tracing::info!(
            "Reissued TLS certificate for {}",
            domains.as_slice().join(", ")
        );

        Ok(TlsCertificate {
            cert_pem,
            key_pem,
            kind,
            origin: CertificateOrigin::Reissued,
        })
    }

    fn load_key(&self) -> Option<(KeyPair, KeyKind, String)> {
        let pem = std::fs::read_to_string(&self.key_path).ok()?;
        let key = match KeyPair::from_pem(&pem) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("Unusable TLS key {:?}: {}", self.key_path, e);
                return None;
            },
        };
        let Some(kind) = KeyKind::of(&key) else {
            tracing::warn!("Unsupported TLS key algorithm in {:?}", self.key_path);
            return None;
        };
        Some((key, kind, pem))
    }

    /// Stored certificate PEM and its names, if it belongs to `key`
    fn load_cert(&self, key: &KeyPair) -> Option<(String, Vec<String>)> {
        let pem = std::fs::read_to_string(&self.cert_path).ok()?;
        let der = rustls_pemfile::certs(&mut pem.as_bytes()).next()?.ok()?;
        let (_, cert) = X509Certificate::from_der(der.as_ref()).ok()?;

        if cert.public_key().subject_public_key.as_ref() != key.public_key_raw() {
            tracing::warn!(
                "TLS certificate {:?} does not belong to key {:?}",
                self.cert_path,
                self.key_path
            );
            return None;
        }

        let names = subject_alt_names(&cert);
        Some((pem, names))
    }

    fn store_cert(&self, cert_pem: &str) -> Result<()> {
        write_private(&self.cert_path, cert_pem.as_bytes())
            .with_context(|| format!("Failed to write TLS certificate: {:?}", self.cert_path))
    }
}

/// Self-sign a CA-flagged server certificate over `key`
fn issue(key: &KeyPair, kind: KeyKind, domains: &DomainSet) -> Result<String> {
    if domains.is_empty() {
        bail!("Cannot issue a certificate without domain names");
    }

    let mut params = CertificateParams::new(domains.as_slice().to_vec())
        .context("Invalid certificate domain names")?;
    params.distinguished_name = DistinguishedName::new();

    let mut serial = random_bytes::<16>();
    // positive INTEGER
    serial[0] &= 0x7f;
    params.serial_number = Some(SerialNumber::from_slice(&serial));

    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2200, 1, 1);
    params.key_usages = kind.key_usages();
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let cert = params
        .self_signed(key)
        .context("Failed to self-sign certificate")?;
    Ok(cert.pem())
}

/// DNS and IP subject alternative names as strings
fn subject_alt_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return Vec::new();
    };
    san.value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            GeneralName::IPAddress(bytes) => ip_from_bytes(bytes).map(|ip| ip.to_string()),
            _ => None,
        })
        .collect()
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}
