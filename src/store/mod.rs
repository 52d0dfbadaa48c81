//! Persistence boundary for source records and master authors.
//!
//! The engine only ever talks to an [`AuthorStore`]. Reads happen once per run;
//! the single write primitive is [`AuthorStore::commit_cluster`], which resolves
//! the cluster's master and links every member as one unit of work.
//!
//! # Implementing a New Backend
//!
//! A SQL backend maps `commit_cluster` onto one transaction:
//!
//! 1. `INSERT .. ON CONFLICT (external_identifier) DO UPDATE .. RETURNING id`
//!    (or a plain insert when the plan has no identifier); the update only
//!    replaces the name when the incoming canonical name is longer
//! 2. `UPDATE source_record SET master_id = $1, state = 'linked'
//!    WHERE id = ANY($2) AND master_id IS NULL`, failing unless every row updated
//!
//! When the backend cannot upsert atomically and loses an insert race on the
//! identifier's unique constraint, it rolls back and returns
//! [`StorageError::DuplicateIdentifier`]; the merge writer then retries and the
//! next attempt finds the now-existing master.

mod memory;
pub mod mock;

pub use memory::{InMemoryStore, StoreSnapshot};
pub use mock::FaultyStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Authorship, MasterAuthor, MasterId, SourceRecord};

/// Everything the writer needs to commit one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPlan {
    /// Member record ids, sorted
    pub members: Vec<String>,
    pub given_name: String,
    pub family_name: String,
    pub canonical_name: String,
    /// Dedup key for find-or-create; `None` always creates a new master
    pub external_identifier: Option<String>,
}

/// Whether the cluster's master was created or found by identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterResolution {
    Created,
    Found,
}

/// Outcome of a successful cluster commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCommit {
    pub master: MasterAuthor,
    pub resolution: MasterResolution,
}

/// The store contract used by the resolution engine.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait AuthorStore: Send + Sync + std::fmt::Debug {
    /// Human-readable backend name, for logs
    fn name(&self) -> &str;

    /// Check that the backend is reachable; a failure aborts a run before any write
    async fn ping(&self) -> Result<(), StorageError>;

    /// All records in `unresolved` state, ordered by id
    async fn unresolved_records(&self) -> Result<Vec<SourceRecord>, StorageError>;

    /// Authorship rows used to derive co-author identities
    async fn authorships(&self) -> Result<Vec<Authorship>, StorageError> {
        Ok(Vec::new())
    }

    /// Get a record by id
    async fn get_record(&self, id: &str) -> Result<Option<SourceRecord>, StorageError>;

    /// Get a master by id
    async fn get_master(&self, id: MasterId) -> Result<Option<MasterAuthor>, StorageError>;

    /// Find the master that owns an external identifier
    async fn find_master_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<MasterAuthor>, StorageError>;

    /// All masters, ordered by canonical name then id
    async fn masters(&self) -> Result<Vec<MasterAuthor>, StorageError>;

    /// Find-or-create the plan's master and link every member to it atomically.
    ///
    /// A found master takes the plan's name only if it is longer than its own.
    /// On error nothing is written.
    async fn commit_cluster(&self, plan: &ClusterPlan) -> Result<ClusterCommit, StorageError>;
}

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Record is already linked to a master
    #[error("Record {record_id} is already linked to master {master_id}")]
    AlreadyLinked {
        record_id: String,
        master_id: MasterId,
    },

    /// Another master already owns this external identifier
    #[error("Duplicate external identifier: {0}")]
    DuplicateIdentifier(String),

    /// Record id already exists
    #[error("Duplicate record id: {0}")]
    DuplicateRecord(String),

    /// Backend cannot be reached at all
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend error
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error (snapshot files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(format!("JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_author_store_object_safe(_: &dyn AuthorStore) {}

    #[test]
    fn test_in_memory_store_as_trait_object() {
        let store: Box<dyn AuthorStore> = Box::new(InMemoryStore::new());
        assert_eq!(store.name(), "in-memory");
        tokio_test::block_on(async {
            store.ping().await.unwrap();
            assert!(store.unresolved_records().await.unwrap().is_empty());
            assert!(store.authorships().await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::DuplicateIdentifier("0000-0001".to_string());
        assert!(err.to_string().contains("0000-0001"));

        let err = StorageError::Unavailable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
