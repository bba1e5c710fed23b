//! Filesystem store backend.
//!
//! Documents are stored as pretty-printed JSON under a two-level hex shard
//! derived from the first four characters of the `pid_hash`:
//!
//! `<base>/<s1>/<s2>/<pid_hash>.json`
//!
//! SHA3-512 hex digests spread uniformly, so two levels keep directory
//! fan-out small without any index file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::{hash_of, matches_filter, DocumentStore, StoreError, StoreResult};

pub struct FsStore {
    base: PathBuf,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path_for(&self, pid_hash: &str) -> StoreResult<PathBuf> {
        let hash = pid_hash.to_ascii_lowercase();
        if hash.len() < 4 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidHash(pid_hash.to_owned()));
        }
        Ok(self
            .base
            .join(&hash[0..2])
            .join(&hash[2..4])
            .join(format!("{hash}.json")))
    }

    async fn write_doc(&self, path: &Path, doc: &Value) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(doc)?;
        fs::write(path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn find_by_hash(&self, pid_hash: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(pid_hash)?;
        let contents = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&contents)?))
    }

    async fn insert(&self, doc: Value) -> StoreResult<Value> {
        let key = hash_of(&doc)?;
        let path = self.path_for(&key)?;
        self.write_doc(&path, &doc).await?;
        Ok(doc)
    }

    async fn update_by_hash(&self, pid_hash: &str, doc: Value) -> StoreResult<bool> {
        let path = self.path_for(pid_hash)?;
        if fs::metadata(&path).await.is_err() {
            return Ok(false);
        }
        self.write_doc(&path, &doc).await?;
        Ok(true)
    }

    async fn delete_by_hash(&self, pid_hash: &str) -> StoreResult<bool> {
        let path = self.path_for(pid_hash)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_all(&self, filter: Option<&Value>) -> StoreResult<Vec<Value>> {
        let mut docs = Vec::new();

        let mut s1_iter = match fs::read_dir(&self.base).await {
            Ok(it) => it,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(docs),
            Err(e) => return Err(e.into()),
        };
        while let Some(s1) = s1_iter.next_entry().await? {
            if !s1.file_type().await?.is_dir() {
                continue;
            }
            let mut s2_iter = fs::read_dir(s1.path()).await?;
            while let Some(s2) = s2_iter.next_entry().await? {
                if !s2.file_type().await?.is_dir() {
                    continue;
                }
                let mut file_iter = fs::read_dir(s2.path()).await?;
                while let Some(entry) = file_iter.next_entry().await? {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let contents = fs::read(&path).await?;
                    match serde_json::from_slice::<Value>(&contents) {
                        Ok(doc) => {
                            if matches_filter(&doc, filter) {
                                docs.push(doc);
                            }
                        }
                        Err(e) => {
                            // Skip unparseable files rather than failing the scan.
                            tracing::warn!("skipping malformed document {}: {e}", path.display());
                        }
                    }
                }
            }
        }

        Ok(docs)
    }
}
