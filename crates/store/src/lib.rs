//! Document store adapter for encrypted patient envelopes.
//!
//! The core never talks to a concrete backend; it holds an
//! `Arc<dyn DocumentStore>` and performs independent single-document
//! operations keyed by `pid_hash`. No operation spans more than one
//! document and there are no transactional guarantees: concurrent writers
//! to the same hash race, last write wins.

use async_trait::async_trait;
use serde_json::Value;

pub mod fs;
pub mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// JSON key every stored document is indexed by.
pub const HASH_KEY: &str = "pid_hash";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document has no string `pid_hash` field")]
    MissingHashKey,
    #[error("hash too short to shard: {0:?}")]
    InvalidHash(String),
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence operations over a collection of JSON documents keyed by
/// `pid_hash`.
///
/// Each operation is independent and idempotent where the return type makes
/// that visible (`update`/`delete` report whether a document was there).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document with the given `pid_hash`, if any.
    async fn find_by_hash(&self, pid_hash: &str) -> StoreResult<Option<Value>>;

    /// Persist a new document and return it as stored.
    ///
    /// The document must carry a string `pid_hash` field.
    async fn insert(&self, doc: Value) -> StoreResult<Value>;

    /// Replace the document at `pid_hash`. Returns `false` when no such
    /// document exists.
    async fn update_by_hash(&self, pid_hash: &str, doc: Value) -> StoreResult<bool>;

    /// Remove the document at `pid_hash`. Returns `false` when no such
    /// document exists.
    async fn delete_by_hash(&self, pid_hash: &str) -> StoreResult<bool>;

    /// All documents whose top-level fields equal every field of `filter`.
    /// `None` returns the whole collection.
    async fn find_all(&self, filter: Option<&Value>) -> StoreResult<Vec<Value>>;
}

/// Extract the `pid_hash` string a document is keyed by.
pub(crate) fn hash_of(doc: &Value) -> StoreResult<String> {
    doc.get(HASH_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(StoreError::MissingHashKey)
}

/// Top-level equality filter: every field of `filter` must be present in
/// `doc` with an equal value. Only plaintext (allow-listed) fields are
/// useful here, since everything else is ciphertext.
pub(crate) fn matches_filter(doc: &Value, filter: Option<&Value>) -> bool {
    let Some(Value::Object(wanted)) = filter else {
        return true;
    };
    wanted.iter().all(|(k, v)| doc.get(k) == Some(v))
}
