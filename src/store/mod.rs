//! Persistence seams: the rule store and the blob store.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use memory::{MemoryBlobStore, MemoryRuleStore};
pub use traits::{BlobMetadata, BlobStore, RuleStore, StoredBlob};
