//! In-memory stores for tests and throwaway deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::rules::model::ProviderConfig;
use crate::store::traits::{BlobMetadata, BlobStore, RuleStore, StoredBlob};

/// Rule store that preserves insertion order.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<(String, String)>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a raw rule value. Replacing keeps the original position.
    pub async fn insert_raw(&self, pattern: &str, raw: &str) {
        let mut rules = self.rules.write().await;
        if let Some(entry) = rules.iter_mut().find(|(p, _)| p == pattern) {
            entry.1 = raw.to_string();
        } else {
            rules.push((pattern.to_string(), raw.to_string()));
        }
    }

    pub async fn insert(&self, pattern: &str, config: &ProviderConfig) {
        self.insert_raw(pattern, &config.to_stored_json().to_string())
            .await;
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.rules.read().await.iter().map(|(p, _)| p.clone()).collect())
    }

    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .find(|(p, _)| p == name)
            .map(|(_, v)| v.clone()))
    }
}

/// Blob store backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: BlobMetadata,
    ) -> Result<(), StoreError> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), StoredBlob { body, metadata });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
