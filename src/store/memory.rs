//! In-memory storage backend.
//!
//! Thread-safe implementation of [`AuthorStore`] for embedded use, tests and
//! offline runs over a JSON snapshot. A single write lock around
//! `commit_cluster` gives the same all-or-nothing guarantee a SQL transaction
//! would, and the identifier index enforces master uniqueness.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AuthorStore, ClusterCommit, ClusterPlan, MasterResolution, StorageError};
use crate::models::{Authorship, MasterAuthor, MasterId, ResolutionState, SourceRecord};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::Backend(format!("poisoned lock: {context}"))
}

/// Serializable image of a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub records: Vec<SourceRecord>,

    #[serde(default)]
    pub authorships: Vec<Authorship>,

    #[serde(default)]
    pub masters: Vec<MasterAuthor>,
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, SourceRecord>,
    authorships: Vec<Authorship>,
    masters: HashMap<MasterId, MasterAuthor>,
    by_identifier: HashMap<String, MasterId>,
}

impl StoreState {
    fn insert_master(&mut self, master: MasterAuthor) -> Result<(), StorageError> {
        if let Some(identifier) = master.external_identifier.as_deref() {
            if self.by_identifier.contains_key(identifier) {
                return Err(StorageError::DuplicateIdentifier(identifier.to_string()));
            }
            self.by_identifier.insert(identifier.to_string(), master.id);
        }
        self.masters.insert(master.id, master);
        Ok(())
    }

    /// Members must exist and still be unresolved
    fn check_members(&self, members: &[String]) -> Result<(), StorageError> {
        for id in members {
            let record = self
                .records
                .get(id)
                .ok_or_else(|| StorageError::RecordNotFound(id.clone()))?;
            if let Some(master_id) = record.master_id {
                return Err(StorageError::AlreadyLinked {
                    record_id: id.clone(),
                    master_id,
                });
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory author store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot, rejecting duplicate record ids and identifiers
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, StorageError> {
        let store = Self::new();
        for record in snapshot.records {
            store.insert_record(record)?;
        }
        for master in snapshot.masters {
            store.insert_master(master)?;
        }
        for authorship in snapshot.authorships {
            store.add_authorship(authorship)?;
        }
        Ok(store)
    }

    /// Load a JSON snapshot file
    pub fn load_snapshot(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        Self::from_snapshot(snapshot)
    }

    /// Current contents, records ordered by id and masters by canonical name
    pub fn snapshot(&self) -> Result<StoreSnapshot, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("snapshot"))?;
        let mut masters: Vec<MasterAuthor> = state.masters.values().cloned().collect();
        masters.sort_by(|a, b| {
            a.canonical_name
                .cmp(&b.canonical_name)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(StoreSnapshot {
            records: state.records.values().cloned().collect(),
            authorships: state.authorships.clone(),
            masters,
        })
    }

    /// Write the current contents as a JSON snapshot file
    pub fn save_snapshot(&self, path: &Path) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(&self.snapshot()?)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Insert a record; errors if its id already exists
    pub fn insert_record(&self, record: SourceRecord) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("insert_record"))?;
        if state.records.contains_key(&record.id) {
            return Err(StorageError::DuplicateRecord(record.id));
        }
        state.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Insert a master; errors if its external identifier is already taken
    pub fn insert_master(&self, master: MasterAuthor) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("insert_master"))?;
        state.insert_master(master)
    }

    /// Record that `record_id` authored `publication_id`
    pub fn add_authorship(&self, authorship: Authorship) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("add_authorship"))?;
        state.authorships.push(authorship);
        Ok(())
    }

    /// Number of masters currently stored
    pub fn master_count(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("master_count"))?;
        Ok(state.masters.len())
    }
}

#[async_trait]
impl AuthorStore for InMemoryStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.state.read().map(|_| ()).map_err(|_| lock_err("ping"))
    }

    async fn unresolved_records(&self) -> Result<Vec<SourceRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("unresolved_records"))?;
        Ok(state
            .records
            .values()
            .filter(|r| r.is_unresolved())
            .cloned()
            .collect())
    }

    async fn authorships(&self) -> Result<Vec<Authorship>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("authorships"))?;
        Ok(state.authorships.clone())
    }

    async fn get_record(&self, id: &str) -> Result<Option<SourceRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get_record"))?;
        Ok(state.records.get(id).cloned())
    }

    async fn get_master(&self, id: MasterId) -> Result<Option<MasterAuthor>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get_master"))?;
        Ok(state.masters.get(&id).cloned())
    }

    async fn find_master_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<MasterAuthor>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("find_master_by_identifier"))?;
        Ok(state
            .by_identifier
            .get(identifier)
            .and_then(|id| state.masters.get(id))
            .cloned())
    }

    async fn masters(&self) -> Result<Vec<MasterAuthor>, StorageError> {
        Ok(self.snapshot()?.masters)
    }

    async fn commit_cluster(&self, plan: &ClusterPlan) -> Result<ClusterCommit, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("commit_cluster"))?;
        state.check_members(&plan.members)?;

        let existing = plan
            .external_identifier
            .as_deref()
            .and_then(|identifier| state.by_identifier.get(identifier).copied());

        let (master, resolution) = match existing {
            Some(master_id) => {
                let master = state
                    .masters
                    .get_mut(&master_id)
                    .ok_or_else(|| StorageError::Backend(format!(
                        "identifier index points at missing master {master_id}"
                    )))?;
                master.refresh_name(&plan.given_name, &plan.family_name, &plan.canonical_name);
                (master.clone(), MasterResolution::Found)
            }
            None => {
                let master = MasterAuthor::new(
                    plan.given_name.clone(),
                    plan.family_name.clone(),
                    plan.external_identifier.clone(),
                )
                .with_canonical_name(plan.canonical_name.clone());
                state.insert_master(master.clone())?;
                (master, MasterResolution::Created)
            }
        };

        for id in &plan.members {
            if let Some(record) = state.records.get_mut(id) {
                record.master_id = Some(master.id);
                record.state = ResolutionState::Linked;
            }
        }

        Ok(ClusterCommit { master, resolution })
    }
}
