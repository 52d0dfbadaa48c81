//! Fault-injecting store for testing the merge writer's failure paths.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::{AuthorStore, ClusterCommit, ClusterPlan, InMemoryStore, StorageError};
use crate::models::{Authorship, MasterAuthor, MasterId, SourceRecord};

/// Wraps an [`InMemoryStore`] and injects failures on demand.
///
/// * `set_unreachable` makes `ping` and every read fail with `Unavailable`
/// * `inject_identifier_races(n)` makes the next `n` identifier commits lose
///   an insert race: a competing master is written first, then the commit
///   fails with `DuplicateIdentifier`
/// * `fail_links_for(id)` makes any commit containing `id` fail after the
///   master step, rolling the whole transaction back
#[derive(Debug)]
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    unreachable: AtomicBool,
    race_failures: AtomicU32,
    failing_members: Mutex<HashSet<String>>,
    commit_calls: AtomicU32,
}

impl FaultyStore {
    /// Create a fault-injecting wrapper around `inner`.
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            unreachable: AtomicBool::new(false),
            race_failures: AtomicU32::new(0),
            failing_members: Mutex::new(HashSet::new()),
            commit_calls: AtomicU32::new(0),
        }
    }

    /// The wrapped store, for inspecting state after a run.
    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    /// Toggle whether the backend answers at all.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Lose the next `count` identifier insert races.
    pub fn inject_identifier_races(&self, count: u32) {
        self.race_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every commit whose members include `record_id`.
    pub fn fail_links_for(&self, record_id: impl Into<String>) {
        if let Ok(mut guard) = self.failing_members.lock() {
            guard.insert(record_id.into());
        }
    }

    /// Number of `commit_cluster` calls seen so far, retries included.
    pub fn commit_calls(&self) -> u32 {
        self.commit_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), StorageError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "connection refused (injected)".to_string(),
            ));
        }
        Ok(())
    }

    fn take_race(&self) -> bool {
        self.race_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn failing_member<'a>(&self, plan: &'a ClusterPlan) -> Result<Option<&'a String>, StorageError> {
        let guard = self
            .failing_members
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock: failing_members".to_string()))?;
        Ok(plan.members.iter().find(|m| guard.contains(*m)))
    }
}

#[async_trait]
impl AuthorStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check_reachable()?;
        self.inner.ping().await
    }

    async fn unresolved_records(&self) -> Result<Vec<SourceRecord>, StorageError> {
        self.check_reachable()?;
        self.inner.unresolved_records().await
    }

    async fn authorships(&self) -> Result<Vec<Authorship>, StorageError> {
        self.check_reachable()?;
        self.inner.authorships().await
    }

    async fn get_record(&self, id: &str) -> Result<Option<SourceRecord>, StorageError> {
        self.check_reachable()?;
        self.inner.get_record(id).await
    }

    async fn get_master(&self, id: MasterId) -> Result<Option<MasterAuthor>, StorageError> {
        self.check_reachable()?;
        self.inner.get_master(id).await
    }

    async fn find_master_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<MasterAuthor>, StorageError> {
        self.check_reachable()?;
        self.inner.find_master_by_identifier(identifier).await
    }

    async fn masters(&self) -> Result<Vec<MasterAuthor>, StorageError> {
        self.check_reachable()?;
        self.inner.masters().await
    }

    async fn commit_cluster(&self, plan: &ClusterPlan) -> Result<ClusterCommit, StorageError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        if let Some(identifier) = plan.external_identifier.as_deref() {
            if self.take_race() {
                // A concurrent writer wins the insert; our transaction rolls back.
                if self.inner.find_master_by_identifier(identifier).await?.is_none() {
                    self.inner.insert_master(MasterAuthor::new(
                        plan.given_name.clone(),
                        plan.family_name.clone(),
                        Some(identifier.to_string()),
                    ))?;
                }
                return Err(StorageError::DuplicateIdentifier(identifier.to_string()));
            }
        }

        if let Some(member) = self.failing_member(plan)? {
            return Err(StorageError::Backend(format!(
                "failed to link record {member} (injected); transaction rolled back"
            )));
        }

        self.inner.commit_cluster(plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordSource, SourceRecordBuilder};
    use crate::store::MasterResolution;

    fn setup() -> FaultyStore {
        let inner = Arc::new(InMemoryStore::new());
        for id in ["a", "b"] {
            inner
                .insert_record(
                    SourceRecordBuilder::new(id, RecordSource::Orcid, "John", "Smith").build(),
                )
                .unwrap();
        }
        FaultyStore::new(inner)
    }

    fn plan(identifier: Option<&str>) -> ClusterPlan {
        ClusterPlan {
            members: vec!["a".to_string(), "b".to_string()],
            given_name: "John".to_string(),
            family_name: "Smith".to_string(),
            canonical_name: "John Smith".to_string(),
            external_identifier: identifier.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_unreachable() {
        let store = setup();
        store.set_unreachable(true);
        assert!(matches!(store.ping().await, Err(StorageError::Unavailable(_))));
        assert!(store.unresolved_records().await.is_err());

        store.set_unreachable(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_race_then_found() {
        let store = setup();
        store.inject_identifier_races(1);

        let first = store.commit_cluster(&plan(Some("0000-0001"))).await;
        assert!(matches!(first, Err(StorageError::DuplicateIdentifier(_))));

        let second = store.commit_cluster(&plan(Some("0000-0001"))).await.unwrap();
        assert_eq!(second.resolution, MasterResolution::Found);
        assert_eq!(store.inner().master_count().unwrap(), 1);
        assert_eq!(store.commit_calls(), 2);
    }

    #[tokio::test]
    async fn test_races_ignored_without_identifier() {
        let store = setup();
        store.inject_identifier_races(5);
        let commit = store.commit_cluster(&plan(None)).await.unwrap();
        assert_eq!(commit.resolution, MasterResolution::Created);
    }

    #[tokio::test]
    async fn test_failing_link_writes_nothing() {
        let store = setup();
        store.fail_links_for("b");

        let result = store.commit_cluster(&plan(Some("0000-0003"))).await;
        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert_eq!(store.inner().master_count().unwrap(), 0);
        assert_eq!(store.unresolved_records().await.unwrap().len(), 2);
    }
}
