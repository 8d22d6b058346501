//! Attachment staging in the blob store.
//!
//! Every staged object gets a freshly minted UUID v4 key, so writes never
//! collide and the store needs no concurrency control. Retention is the
//! caller's decision: staged blobs live until [`BlobStager::delete`].

pub mod routes;

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{BlobMetadata, BlobStore, StoredBlob};

pub use routes::{retrieval_routes, unmatched};

/// A blob written by [`BlobStager::stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub id: String,
    pub url: String,
}

/// Mint a new blob id (lowercase hyphenated UUID).
pub fn new_blob_id() -> String {
    Uuid::new_v4().to_string()
}

/// Writes attachment bytes to a [`BlobStore`] and hands out retrieval URLs.
#[derive(Clone)]
pub struct BlobStager {
    store: Arc<dyn BlobStore>,
    url_prefix: String,
}

impl BlobStager {
    pub fn new(store: Arc<dyn BlobStore>, url_prefix: impl Into<String>) -> Self {
        let url_prefix = url_prefix.into().trim_end_matches('/').to_string();
        Self { store, url_prefix }
    }

    /// `{prefix}/{id}`
    pub fn retrieval_url(&self, id: &str) -> String {
        format!("{}/{id}", self.url_prefix)
    }

    /// Store bytes under a caller-supplied id. Reusing an id overwrites.
    pub async fn put(
        &self,
        id: &str,
        bytes: Vec<u8>,
        metadata: BlobMetadata,
    ) -> Result<StagedBlob, StoreError> {
        let size = bytes.len();
        self.store.put(id, bytes, metadata).await?;
        debug!(blob_id = id, size, "Staged blob");
        Ok(StagedBlob {
            id: id.to_string(),
            url: self.retrieval_url(id),
        })
    }

    /// Stage bytes under a fresh id.
    pub async fn stage(
        &self,
        filename: &str,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<StagedBlob, StoreError> {
        let id = new_blob_id();
        self.put(&id, bytes, BlobMetadata::attachment(filename, content_type))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredBlob>, StoreError> {
        self.store.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        debug!(blob_id = id, "Deleted staged blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBlobStore;

    fn stager() -> BlobStager {
        BlobStager::new(Arc::new(MemoryBlobStore::new()), "https://files.example.com/")
    }

    #[tokio::test]
    async fn stage_then_get_returns_same_bytes() {
        let s = stager();
        let staged = s.stage("f.txt", None, b"B".to_vec()).await.unwrap();
        assert_eq!(staged.url, format!("https://files.example.com/{}", staged.id));

        let blob = s.get(&staged.id).await.unwrap().unwrap();
        assert_eq!(blob.body, b"B");
        assert!(blob.metadata.content_disposition.contains("f.txt"));
    }

    #[tokio::test]
    async fn every_stage_mints_a_new_id() {
        let s = stager();
        let a = s.stage("a", None, vec![1]).await.unwrap();
        let b = s.stage("a", None, vec![1]).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn delete_missing_blob_is_ok() {
        let s = stager();
        s.delete(&new_blob_id()).await.unwrap();
    }

    #[test]
    fn blob_ids_are_lowercase_uuids() {
        let id = new_blob_id();
        assert!(routes::is_blob_id(&id));
        assert_eq!(id, id.to_lowercase());
    }
}
