//! Randomization utilities

use rand::RngCore;

/// Generate random bytes from the thread-local CSPRNG
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; N];
    rng.fill_bytes(&mut bytes);
    bytes
}
