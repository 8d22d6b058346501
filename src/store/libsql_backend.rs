//! libSQL backend for the rule store and the blob store.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::rules::model::ProviderConfig;
use crate::store::migrations;
use crate::store::traits::{BlobMetadata, BlobStore, RuleStore, StoredBlob};

/// libSQL-backed store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Backend(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Insert or replace a rule. A replaced rule keeps its list position;
    /// a new rule is appended.
    pub async fn upsert_rule(&self, pattern: &str, config: &ProviderConfig) -> Result<(), StoreError> {
        let raw = config.to_stored_json().to_string();
        self.conn
            .execute(
                "INSERT INTO rules (pattern, config, position)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(position), 0) + 1 FROM rules))
                 ON CONFLICT(pattern) DO UPDATE SET
                    config = excluded.config,
                    updated_at = datetime('now')",
                params![pattern, raw],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_rule: {e}")))?;
        debug!(pattern, provider = %config.provider_type(), "Rule stored");
        Ok(())
    }

    pub async fn remove_rule(&self, pattern: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM rules WHERE pattern = ?1", params![pattern])
            .await
            .map_err(|e| StoreError::Query(format!("remove_rule: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for LibSqlStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT pattern FROM rules ORDER BY position ASC", ())
            .await
            .map_err(|e| StoreError::Query(format!("list rules: {e}")))?;

        let mut names = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list rules: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("list rules row parse: {e}")))?;
            names.push(name);
        }
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT config FROM rules WHERE pattern = ?1", params![name])
            .await
            .map_err(|e| StoreError::Query(format!("get rule: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get rule row parse: {e}")))?;
                Ok(Some(raw))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get rule: {e}"))),
        }
    }
}

#[async_trait]
impl BlobStore for LibSqlStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: BlobMetadata,
    ) -> Result<(), StoreError> {
        let size = body.len();
        self.conn
            .execute(
                "INSERT INTO blobs (id, body, content_type, content_disposition, filename, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    body = excluded.body,
                    content_type = excluded.content_type,
                    content_disposition = excluded.content_disposition,
                    filename = excluded.filename,
                    created_at = excluded.created_at",
                params![
                    key,
                    libsql::Value::Blob(body),
                    metadata.content_type,
                    metadata.content_disposition,
                    metadata.filename,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("put blob: {e}")))?;
        debug!(blob_id = key, size, "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT body, content_type, content_disposition, filename FROM blobs WHERE id = ?1",
                params![key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get blob: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Query(format!("get blob: {e}"))),
        };

        let parse = |e: libsql::Error| StoreError::Query(format!("get blob row parse: {e}"));
        Ok(Some(StoredBlob {
            body: row.get::<Vec<u8>>(0).map_err(parse)?,
            metadata: BlobMetadata {
                content_type: row.get::<String>(1).map_err(parse)?,
                content_disposition: row.get::<String>(2).map_err(parse)?,
                filename: row.get::<String>(3).map_err(parse)?,
            },
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM blobs WHERE id = ?1", params![key])
            .await
            .map_err(|e| StoreError::Query(format!("delete blob: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::SlackConfig;
    use secrecy::SecretString;

    async fn test_store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    fn slack(channel: &str) -> ProviderConfig {
        ProviderConfig::Slack(SlackConfig {
            token: SecretString::from("xoxb".to_string()),
            channel_id: channel.into(),
        })
    }

    #[tokio::test]
    async fn rules_list_in_insertion_order() {
        let store = test_store().await;
        store.upsert_rule("z@x.com", &slack("C1")).await.unwrap();
        store.upsert_rule("a@x.com", &slack("C2")).await.unwrap();
        store.upsert_rule("z@x.com", &slack("C3")).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["z@x.com", "a@x.com"]);
        let raw = RuleStore::get(&store, "z@x.com").await.unwrap().unwrap();
        assert!(raw.contains("C3"));
    }

    #[tokio::test]
    async fn remove_rule_drops_it_from_listing() {
        let store = test_store().await;
        store.upsert_rule("a@x.com", &slack("C1")).await.unwrap();
        store.remove_rule("a@x.com").await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(RuleStore::get(&store, "a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blob_put_get_delete() {
        let store = test_store().await;
        let meta = BlobMetadata::attachment("f.txt", Some("text/plain"));
        store.put("id-1", b"hello".to_vec(), meta.clone()).await.unwrap();

        let blob = BlobStore::get(&store, "id-1").await.unwrap().unwrap();
        assert_eq!(blob.body, b"hello");
        assert_eq!(blob.metadata, meta);

        store.delete("id-1").await.unwrap();
        store.delete("id-1").await.unwrap();
        assert!(BlobStore::get(&store, "id-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blob_put_overwrites_existing_key() {
        let store = test_store().await;
        store
            .put("k", b"one".to_vec(), BlobMetadata::attachment("a", None))
            .await
            .unwrap();
        store
            .put("k", b"two".to_vec(), BlobMetadata::attachment("b", None))
            .await
            .unwrap();
        let blob = BlobStore::get(&store, "k").await.unwrap().unwrap();
        assert_eq!(blob.body, b"two");
        assert_eq!(blob.metadata.filename, "b");
    }

    #[tokio::test]
    async fn local_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/relay.db");
        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.upsert_rule("a@x.com", &slack("C1")).await.unwrap();
        }
        let store = LibSqlStore::new_local(&path).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a@x.com"]);
    }
}
