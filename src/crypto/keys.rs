//! Ed25519 key management for the v3 onion service

use crate::util::fs::write_private;
use anyhow::{Context, Result};
use data_encoding::{BASE32_NOPAD, BASE64};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use sha2::{Digest as Sha2Digest, Sha512};
use sha3::Sha3_256;
use std::path::Path;

/// Tag at the start of Tor's `hs_ed25519_secret_key` file
pub const SECRET_KEY_TAG: &[u8] = b"== ed25519v1-secret: type0 ==";

/// Tag plus zero padding
pub const SECRET_KEY_HEADER_LEN: usize = 32;

/// Smallest file that still holds the whole expanded key
pub const SECRET_KEY_MIN_LEN: usize = SECRET_KEY_HEADER_LEN + 64;

/// Onion address version byte
const ONION_VERSION: u8 = 0x03;

/// Hidden service key in Tor's expanded form
///
/// The public key is only known for freshly generated keys. For a key loaded
/// from disk the address comes back from Tor as the ServiceID.
#[derive(Clone)]
pub struct HiddenServiceKey {
    expanded: [u8; 64],
    public_key: Option<[u8; 32]>,
}

impl HiddenServiceKey {
    /// Generate a fresh key pair from the OS RNG
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_seed(&signing_key.to_bytes())
    }

    /// Derive the expanded key and public key from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self {
            expanded: expand_seed(seed),
            public_key: Some(signing_key.verifying_key().to_bytes()),
        }
    }

    /// Parse Tor's key container, checking the tag
    pub fn from_file_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < SECRET_KEY_MIN_LEN || !bytes.starts_with(SECRET_KEY_TAG) {
            return None;
        }
        let mut expanded = [0u8; 64];
        expanded.copy_from_slice(&bytes[SECRET_KEY_HEADER_LEN..SECRET_KEY_MIN_LEN]);
        Some(Self {
            expanded,
            public_key: None,
        })
    }

    /// Serialize into Tor's key container: tag, padding, key, newline
    pub fn to_file_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECRET_KEY_MIN_LEN + 1);
        out.extend_from_slice(SECRET_KEY_TAG);
        out.resize(SECRET_KEY_HEADER_LEN, 0);
        out.extend_from_slice(&self.expanded);
        out.push(b'\n');
        out
    }

    /// The 64-byte expanded secret (clamped scalar followed by the hash prefix)
    pub fn expanded(&self) -> &[u8; 64] {
        &self.expanded
    }

    pub fn public_key(&self) -> Option<&[u8; 32]> {
        self.public_key.as_ref()
    }

    /// Onion address, when the public key is known
    pub fn onion_address(&self) -> Option<String> {
        self.public_key.as_ref().map(onion_address_from_pubkey)
    }

    /// Base64 blob for `ADD_ONION ED25519-V3:<blob>`
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.expanded)
    }
}

impl std::fmt::Debug for HiddenServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiddenServiceKey")
            .field("onion_address", &self.onion_address())
            .finish_non_exhaustive()
    }
}

/// SHA-512 of the seed with ed25519 clamping on the scalar half
pub fn expand_seed(seed: &[u8; 32]) -> [u8; 64] {
    let digest = Sha512::digest(seed);
    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&digest);
    expanded[0] &= 248;
    expanded[31] &= 63;
    expanded[31] |= 64;
    expanded
}

/// Derive the v3 onion address from a public key
pub fn onion_address_from_pubkey(pubkey: &[u8; 32]) -> String {
    // Checksum = H(".onion checksum" || pubkey || version)[:2]
    let mut hasher = Sha3_256::new();
    hasher.update(b".onion checksum");
    hasher.update(pubkey);
    hasher.update([ONION_VERSION]);
    let checksum = hasher.finalize();

    let mut addr_bytes = [0u8; 35];
    addr_bytes[..32].copy_from_slice(pubkey);
    addr_bytes[32..34].copy_from_slice(&checksum[..2]);
    addr_bytes[34] = ONION_VERSION;

    format!("{}.onion", BASE32_NOPAD.encode(&addr_bytes).to_lowercase())
}

/// Load the key at `path`, or generate and persist a new one
///
/// A missing, short, or mistagged file is replaced. Failing to write the
/// replacement is fatal.
pub fn resolve_key(path: &Path) -> Result<HiddenServiceKey> {
    match std::fs::read(path) {
        Ok(bytes) => {
            if let Some(key) = HiddenServiceKey::from_file_bytes(&bytes) {
                tracing::info!("Loaded hidden service key from {:?}", path);
                return Ok(key);
            }
            tracing::warn!(
                "Hidden service key {:?} is not a valid key file ({} bytes), generating a new one",
                path,
                bytes.len()
            );
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No hidden service key at {:?}, generating one", path);
        },
        Err(e) => {
            tracing::warn!("Unable to read hidden service key {:?}: {}, generating one", path, e);
        },
    }

    let key = HiddenServiceKey::generate();
    write_private(path, &key.to_file_bytes())
        .with_context(|| format!("Failed to write hidden service key: {:?}", path))?;
    if let Some(address) = key.onion_address() {
        tracing::info!("Generated hidden service key for {}", address);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pubkey_from_hex(hex_str: &str) -> [u8; 32] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_onion_address_golden() {
        let mut pubkey = [0u8; 32];
        for (i, b) in pubkey.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(
            onion_address_from_pubkey(&pubkey),
            "aaaqeayeaudaocajbifqydiob4ibceqtcqkrmfyydenbwha5dyp3kead.onion"
        );
        assert_eq!(
            onion_address_from_pubkey(&[0x42; 32]),
            "ijbeeqscijbeeqscijbeeqscijbeeqscijbeeqscijbeeqscijbezhid.onion"
        );
    }

    #[test]
    fn test_real_onion_address() {
        let pubkey =
            pubkey_from_hex("1c4801e26e2827173e721a7c877d7bbbe6124fce6bb0d76b15fa50275d4dc033");
        assert_eq!(
            onion_address_from_pubkey(&pubkey),
            "dreadytofatroptsdj6io7l3xptbet6onoyno2yv7jicoxknyazubrad.onion"
        );
    }

    #[test]
    fn test_zero_seed_expansion() {
        let key = HiddenServiceKey::from_seed(&[0u8; 32]);
        assert_eq!(
            hex::encode(key.expanded()),
            "5046adc1dba838867b2bbbfdd0c3423e58b57970b5267a90f57960924a87f156\
             0a6a85eaa642dac835424b5d7c8d637c00408c7a73da672b7f498521420b6dd3"
        );
        assert_eq!(
            hex::encode(key.public_key().unwrap()),
            "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29"
        );
        assert_eq!(
            key.onion_address().unwrap(),
            "hnvcppgow2sc2yvdvdicu3ynonsteflxdxrehjr2ybekdc2z3iu63yid.onion"
        );
    }

    #[test]
    fn test_clamping_bits() {
        for _ in 0..16 {
            let key = HiddenServiceKey::generate();
            let expanded = key.expanded();
            assert_eq!(expanded[0] & 0b0000_0111, 0);
            assert_eq!(expanded[31] & 0b1000_0000, 0);
            assert_eq!(expanded[31] & 0b0100_0000, 0b0100_0000);
        }
    }

    #[test]
    fn test_file_layout() {
        let key = HiddenServiceKey::from_seed(&[7u8; 32]);
        let bytes = key.to_file_bytes();
        assert_eq!(bytes.len(), 97);
        assert!(bytes.starts_with(SECRET_KEY_TAG));
        assert!(bytes[SECRET_KEY_TAG.len()..32].iter().all(|&b| b == 0));
        assert_eq!(&bytes[32..96], key.expanded());
        assert_eq!(bytes[96], b'\n');
    }

    #[test]
    fn test_resolve_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tor").join("hs_ed25519_secret_key");

        let generated = resolve_key(&path).unwrap();
        assert!(generated.onion_address().is_some());

        let loaded = resolve_key(&path).unwrap();
        assert_eq!(loaded.expanded(), generated.expanded());
        assert!(loaded.onion_address().is_none());

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[32..96], generated.expanded());
    }

    #[test]
    fn test_short_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hs_ed25519_secret_key");
        std::fs::write(&path, b"== ed25519v1-secret: type0 ==").unwrap();

        let key = resolve_key(&path).unwrap();
        assert!(key.onion_address().is_some());
        assert_eq!(std::fs::read(&path).unwrap().len(), 97);
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let mut bytes = HiddenServiceKey::from_seed(&[1u8; 32]).to_file_bytes();
        bytes[3] = b'x';
        assert!(HiddenServiceKey::from_file_bytes(&bytes).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hs_ed25519_secret_key");
        resolve_key(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
