//! Cryptographic primitives for the v3 onion service
//!
//! Hidden service key derivation and onion addresses.
//! File IO is limited to resolving the key container.

pub mod keys;

pub use keys::{expand_seed, onion_address_from_pubkey, resolve_key, HiddenServiceKey};
