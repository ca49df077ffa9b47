use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{BlobError, BlobStore};

/// Map-backed [`BlobStore`]. Keys listed with [`MemoryBlobStore::fail_key`]
/// answer with a transport error instead of their bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing: Arc<RwLock<Vec<String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), data.into());
    }

    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(key.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let failing = self.failing.read().unwrap_or_else(|e| e.into_inner());
        if failing.iter().any(|k| k == key) {
            return Err(BlobError::transport(key, "connection reset by peer"));
        }

        self.blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                key: key.to_string(),
            })
    }
}
