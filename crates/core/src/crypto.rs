//! Recursive field encryption for patient documents.
//!
//! Documents are encrypted field-by-field: container structure (objects and
//! arrays) stays plaintext so an envelope remains navigable without the
//! key, while every terminal scalar outside the allow-list becomes an
//! opaque tagged string. A ciphertext is AES-256-GCM over the
//! JSON-serialised scalar, with the random 12-byte nonce prepended, then
//! base64-encoded behind an `enc1:` tag. The tag is what lets decryption
//! distinguish "legacy plaintext, leave it alone" from "ciphertext that
//! failed to authenticate".
//!
//! Both directions are pure transformations of (document, key material).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use sha3::{Digest, Sha3_512};

use crate::error::{CoreError, CoreResult};

/// Fields that are never encrypted because they back indexed search.
/// Fixed set, not user-configurable.
pub const PLAINTEXT_KEYS: [&str; 4] =
    ["fishery_id", "fishery_name", "pid_hash", "base_email_hash"];

/// Prefix marking an encrypted scalar in a stored document.
const CIPHERTEXT_TAG: &str = "enc1:";

const NONCE_LEN: usize = 12;

/// SHA3-512 hex digest of a string. Used for `pid_hash`,
/// `base_email_hash` and master-key validation.
pub fn hash_string(s: &str) -> String {
    hex::encode(Sha3_512::digest(s.as_bytes()))
}

pub fn is_plaintext_key(key: &str) -> bool {
    PLAINTEXT_KEYS.contains(&key)
}

/// 32 bytes of symmetric key material, supplied per request and never
/// persisted. The `Debug` impl is redacted so key bytes cannot leak into
/// logs through error formatting.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Decode a base64 master-key string into key material.
    pub fn from_base64(key_data: &str) -> CoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(key_data.trim())
            .map_err(|_| CoreError::InvalidKeyMaterial)?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKeyMaterial)?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Encrypt one terminal scalar as an opaque unit.
///
/// Nulls and empty strings pass through: encrypting nothing yields nothing.
fn encrypt_value(value: &Value, key: &MasterKey) -> CoreResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.is_empty() => Ok(Value::String(String::new())),
        other => {
            let plaintext = serde_json::to_vec(other)?;

            let mut nonce_bytes = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let ciphertext = key
                .cipher()
                .encrypt(nonce, plaintext.as_slice())
                .map_err(|_| CoreError::EncryptionFailure)?;

            let mut blob = nonce_bytes.to_vec();
            blob.extend_from_slice(&ciphertext);
            Ok(Value::String(format!(
                "{CIPHERTEXT_TAG}{}",
                general_purpose::STANDARD.encode(blob)
            )))
        }
    }
}

/// Decrypt one terminal value.
///
/// Values without the ciphertext tag are returned unchanged, so decrypting
/// an allow-listed field or a legacy plaintext record is a no-op. A tagged
/// value that fails to decode or authenticate is a `DecryptionFailure`,
/// never a silently-wrong scalar.
fn decrypt_value(value: &Value, key: &MasterKey) -> CoreResult<Value> {
    let Value::String(s) = value else {
        return Ok(value.clone());
    };
    let Some(encoded) = s.strip_prefix(CIPHERTEXT_TAG) else {
        return Ok(value.clone());
    };

    let blob = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| CoreError::DecryptionFailure)?;
    if blob.len() < NONCE_LEN {
        return Err(CoreError::DecryptionFailure);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CoreError::DecryptionFailure)?;

    serde_json::from_slice(&plaintext).map_err(|_| CoreError::DecryptionFailure)
}

/// Recursively encrypt a document, preserving its shape.
pub fn encrypt_document(doc: &Value, key: &MasterKey) -> CoreResult<Value> {
    match doc {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_plaintext_key(k) {
                    out.insert(k.clone(), v.clone());
                } else {
                    out.insert(k.clone(), encrypt_document(v, key)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(encrypt_document(item, key)?);
            }
            Ok(Value::Array(out))
        }
        scalar => encrypt_value(scalar, key),
    }
}

/// Recursively decrypt a document previously produced by
/// [`encrypt_document`] (or a legacy plaintext document, which round-trips
/// unchanged).
pub fn decrypt_document(doc: &Value, key: &MasterKey) -> CoreResult<Value> {
    match doc {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_plaintext_key(k) {
                    out.insert(k.clone(), v.clone());
                } else {
                    out.insert(k.clone(), decrypt_document(v, key)?);
                }
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(decrypt_document(item, key)?);
            }
            Ok(Value::Array(out))
        }
        scalar => decrypt_value(scalar, key),
    }
}
