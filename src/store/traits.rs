//! Storage seams consumed by the relay core.
//!
//! The rule store is read-only from the core's point of view. The blob store
//! is the only shared mutable resource; callers always write under freshly
//! minted keys, so no locking discipline is required on top of it.

use async_trait::async_trait;

use crate::error::StoreError;

/// HTTP-facing metadata stored alongside a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub content_type: String,
    pub content_disposition: String,
    pub filename: String,
}

impl BlobMetadata {
    /// Metadata for a downloadable attachment. Falls back to
    /// `application/octet-stream` when no MIME type is known.
    pub fn attachment(filename: &str, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream");
        Self {
            content_type: content_type.to_string(),
            content_disposition: content_disposition(filename),
            filename: filename.to_string(),
        }
    }
}

/// `attachment; filename="<name>"` with embedded quotes escaped.
pub fn content_disposition(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename.replace('"', "\\\""))
}

/// A blob as returned by [`BlobStore::get`].
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub body: Vec<u8>,
    pub metadata: BlobMetadata,
}

/// Key/value store of routing rules: key = destination pattern,
/// value = serialized provider configuration.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// List rule names in the store's iteration order.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch the serialized configuration for a rule name.
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError>;
}

/// Object store for staged attachment bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, silently overwriting any previous value.
    async fn put(&self, key: &str, body: Vec<u8>, metadata: BlobMetadata)
    -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, StoreError>;

    /// Delete `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_metadata_defaults_content_type() {
        let meta = BlobMetadata::attachment("report.pdf", None);
        assert_eq!(meta.content_type, "application/octet-stream");
        assert_eq!(meta.content_disposition, "attachment; filename=\"report.pdf\"");
        assert_eq!(meta.filename, "report.pdf");
    }

    #[test]
    fn attachment_metadata_keeps_declared_type() {
        let meta = BlobMetadata::attachment("a.png", Some("image/png"));
        assert_eq!(meta.content_type, "image/png");
    }

    #[test]
    fn content_disposition_escapes_quotes() {
        assert_eq!(
            content_disposition("say \"hi\".txt"),
            "attachment; filename=\"say \\\"hi\\\".txt\""
        );
    }
}
