//! Merge writer: commits one cluster per store transaction.
//!
//! A lost identifier race comes back from the store as
//! `DuplicateIdentifier`; the writer retries the whole commit, which then
//! finds the master the other writer created. Any other error fails the
//! cluster without touching the rest of the run.

use std::sync::Arc;

use tracing::{debug, warn, Instrument};

use crate::models::{ClusterFailure, ClusterFailureKind, LinkedCluster, MasterOutcome};
use crate::store::{AuthorStore, ClusterPlan, MasterResolution};
use crate::utils::{with_retry, RetryConfig, RetryResult};

/// Result of committing one cluster
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Linked(LinkedCluster),
    Failed(ClusterFailure),
}

#[derive(Debug, Clone)]
pub struct MergeWriter {
    store: Arc<dyn AuthorStore>,
    retry: RetryConfig,
}

impl MergeWriter {
    pub fn new(store: Arc<dyn AuthorStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Find-or-create the master for `plan` and link its members
    pub async fn commit(&self, plan: &ClusterPlan) -> CommitOutcome {
        let lead = plan.members.first().cloned().unwrap_or_default();
        let span = tracing::debug_span!("commit_cluster", lead = %lead, size = plan.members.len());

        async {
            let store = &self.store;
            match with_retry(self.retry, || store.commit_cluster(plan)).await {
                RetryResult::Success(commit, attempts) => {
                    let outcome = match commit.resolution {
                        MasterResolution::Created => MasterOutcome::Created,
                        MasterResolution::Found => MasterOutcome::MergedIntoExisting,
                    };
                    debug!(
                        "Linked {} records to master {} ({:?}, {} attempt(s))",
                        plan.members.len(),
                        commit.master.id,
                        outcome,
                        attempts
                    );
                    CommitOutcome::Linked(LinkedCluster {
                        members: plan.members.clone(),
                        master_id: commit.master.id,
                        outcome,
                    })
                }
                RetryResult::TransientFailure(err, _, attempts) => {
                    warn!(
                        "Giving up on cluster after {} identifier races: {}",
                        attempts, err
                    );
                    CommitOutcome::Failed(ClusterFailure {
                        members: plan.members.clone(),
                        failure: ClusterFailureKind::RaceRetriesExhausted { attempts },
                    })
                }
                RetryResult::PermanentFailure(err) => {
                    warn!("Cluster commit rolled back: {}", err);
                    CommitOutcome::Failed(ClusterFailure {
                        members: plan.members.clone(),
                        failure: ClusterFailureKind::Persistence {
                            message: err.to_string(),
                        },
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}
