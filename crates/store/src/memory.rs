//! In-memory store backend, used in tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{hash_of, matches_filter, DocumentStore, StoreResult};

/// `HashMap` behind a tokio `RwLock`. Reads are shared, writes exclusive;
/// there is still no cross-operation atomicity, matching the trait contract.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_hash(&self, pid_hash: &str) -> StoreResult<Option<Value>> {
        Ok(self.docs.read().await.get(pid_hash).cloned())
    }

    async fn insert(&self, doc: Value) -> StoreResult<Value> {
        let key = hash_of(&doc)?;
        self.docs.write().await.insert(key, doc.clone());
        Ok(doc)
    }

    async fn update_by_hash(&self, pid_hash: &str, doc: Value) -> StoreResult<bool> {
        let mut docs = self.docs.write().await;
        if !docs.contains_key(pid_hash) {
            return Ok(false);
        }
        docs.insert(pid_hash.to_owned(), doc);
        Ok(true)
    }

    async fn delete_by_hash(&self, pid_hash: &str) -> StoreResult<bool> {
        Ok(self.docs.write().await.remove(pid_hash).is_some())
    }

    async fn find_all(&self, filter: Option<&Value>) -> StoreResult<Vec<Value>> {
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .filter(|d| matches_filter(d, filter))
            .cloned()
            .collect())
    }
}
