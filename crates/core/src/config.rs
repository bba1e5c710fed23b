//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core
//! services; request paths never read process-wide environment variables.

use crate::error::{CoreError, CoreResult};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    key_hash: String,
    alerts_enabled: bool,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `key_hash` is the SHA3-512 hex digest of the master key string and
    /// must look like one; the key itself is never part of configuration.
    pub fn new(key_hash: String, alerts_enabled: bool) -> CoreResult<Self> {
        let trimmed = key_hash.trim();
        if trimmed.len() != 128 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidInput(
                "key_hash must be a 128-character hex digest".into(),
            ));
        }
        Ok(Self {
            key_hash: trimmed.to_owned(),
            alerts_enabled,
        })
    }

    pub fn key_hash(&self) -> &str {
        &self.key_hash
    }

    pub fn alerts_enabled(&self) -> bool {
        self.alerts_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_string;

    #[test]
    fn accepts_a_real_digest() {
        let cfg = CoreConfig::new(hash_string("master"), true).unwrap();
        assert_eq!(cfg.key_hash().len(), 128);
        assert!(cfg.alerts_enabled());
    }

    #[test]
    fn rejects_non_digest_values() {
        assert!(CoreConfig::new("".into(), false).is_err());
        assert!(CoreConfig::new("deadbeef".into(), false).is_err());
        assert!(CoreConfig::new("z".repeat(128), false).is_err());
    }
}
