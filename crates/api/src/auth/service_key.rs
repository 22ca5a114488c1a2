//! Shared service credential for the workflow engine.
//!
//! Only the SHA-256 digest of the configured key is kept in memory.
//! Presented keys are hashed and compared in constant time.

use sha2::{Digest, Sha256};

/// Header carrying the service key.
pub const SERVICE_KEY_HEADER: &str = "x-service-key";

/// Header naming the user a service caller acts for.
pub const ON_BEHALF_OF_HEADER: &str = "x-on-behalf-of";

#[derive(Clone)]
pub struct ServiceKey {
    digest: [u8; 32],
}

impl ServiceKey {
    pub fn new(plaintext: &str) -> Self {
        Self {
            digest: sha256(plaintext),
        }
    }

    /// Check a presented key against the configured one.
    pub fn verify(&self, presented: &str) -> bool {
        constant_time_eq(&self.digest, &sha256(presented))
    }
}

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ServiceKey(..)")
    }
}

fn sha256(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_configured_key() {
        let key = ServiceKey::new("engine-secret");
        assert!(key.verify("engine-secret"));
    }

    #[test]
    fn rejects_other_keys() {
        let key = ServiceKey::new("engine-secret");
        assert!(!key.verify("engine-secret "));
        assert!(!key.verify(""));
        assert!(!key.verify("ENGINE-SECRET"));
    }

    #[test]
    fn debug_does_not_leak_the_digest() {
        let key = ServiceKey::new("engine-secret");
        assert_eq!(format!("{key:?}"), "ServiceKey(..)");
    }
}
