//! Credential gate.
//!
//! A single shared master key is distributed out-of-band; the gate holds
//! only the SHA3-512 hex digest of the correct key string and compares
//! digests. Every mutating or decrypting service operation checks this
//! first and short-circuits with a uniform invalid-credential outcome.

use crate::crypto::hash_string;
use crate::error::{CoreError, CoreResult};

#[derive(Clone, Debug)]
pub struct CredentialGate {
    key_hash: String,
}

impl CredentialGate {
    pub fn new(key_hash: impl Into<String>) -> Self {
        Self {
            key_hash: key_hash.into(),
        }
    }

    /// Hash target built from a known-good key string, mainly for tests
    /// and provisioning tooling.
    pub fn for_key(key_data: &str) -> Self {
        Self::new(hash_string(key_data))
    }

    /// Whether the presented key string hashes to the configured target.
    pub fn is_valid(&self, presented: &str) -> bool {
        hash_string(presented) == self.key_hash
    }

    /// Gate an operation: `Ok(())` for a valid key, the uniform
    /// `InvalidCredential` otherwise.
    pub fn require(&self, presented: &str) -> CoreResult<()> {
        if self.is_valid(presented) {
            Ok(())
        } else {
            Err(CoreError::InvalidCredential)
        }
    }
}
