//! The author resolution engine.
//!
//! A run reads every unresolved record once, partitions them into blocks,
//! scores candidate pairs inside each block on a pool of blocking tasks,
//! clusters accepted pairs into connected components and commits one master
//! per cluster through the [`MergeWriter`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use author_resolver::config::ResolverConfig;
//! use author_resolver::resolve::Resolver;
//! use author_resolver::store::InMemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::load_snapshot("authors.json".as_ref())?);
//! let resolver = Resolver::new(ResolverConfig::default(), store)?;
//! let report = resolver.run().await?;
//! println!("{} masters created", report.masters_created);
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod canonical;
pub mod cluster;
pub mod coauthors;
pub mod scorer;
pub mod signals;
pub mod writer;

pub use blocking::{Block, BlockPartition, BlockingIndex};
pub use canonical::{canonicalize, Canonical};
pub use cluster::CandidateGraph;
pub use coauthors::CoauthorIndex;
pub use scorer::{PairScore, PairScorer};
pub use signals::RecordFeatures;
pub use writer::{CommitOutcome, MergeWriter};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ResolverConfig;
use crate::models::{
    CandidatePair, Cluster, ClusterFailure, ClusterFailureKind, MasterOutcome, PairKey, RunReport,
    SourceRecord,
};
use crate::store::{AuthorStore, ClusterPlan, StorageError};

/// Errors that abort a resolution run
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The store could not be reached; nothing was written
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),

    /// Reading the unresolved universe failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A scoring worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),
}

fn read_error(err: StorageError) -> ResolveError {
    match err {
        StorageError::Unavailable(_) => ResolveError::StoreUnavailable(err),
        other => ResolveError::Storage(other),
    }
}

/// Output of a dry run: the clusters a run would commit and how
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    pub clusters: Vec<Cluster>,
    /// Canonicalization of each cluster, aligned with `clusters`
    pub canonical: Vec<Canonical>,
    pub report: RunReport,
}

struct Analysis {
    records: HashMap<String, SourceRecord>,
    clusters: Vec<Cluster>,
    report: RunReport,
}

/// Resolves unresolved source records into master authors
#[derive(Debug, Clone)]
pub struct Resolver {
    config: ResolverConfig,
    store: Arc<dyn AuthorStore>,
    blocking: Arc<BlockingIndex>,
    scorer: Arc<PairScorer>,
}

impl Resolver {
    /// Create a resolver over `store`; fails if the configuration is invalid
    pub fn new(config: ResolverConfig, store: Arc<dyn AuthorStore>) -> Result<Self, ResolveError> {
        config
            .validate()
            .map_err(|e| ResolveError::Config(e.to_string()))?;

        Ok(Self {
            blocking: Arc::new(BlockingIndex::new(config.blocking.clone())),
            scorer: Arc::new(PairScorer::new(config.scoring.clone())),
            config,
            store,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run blocking, scoring, clustering and the merge writer.
    ///
    /// Only an unreachable store or a failed read aborts the run; per-cluster
    /// write failures are reported in the returned [`RunReport`].
    pub async fn run(&self) -> Result<RunReport, ResolveError> {
        let span = info_span!("resolve_run", store = self.store.name());
        async {
            self.store
                .ping()
                .await
                .map_err(ResolveError::StoreUnavailable)?;

            let analysis = self.analyze().await?;
            let report = self.write(analysis).await;

            info!(
                "Resolution finished: {} clusters, {} masters created, {} merged, {} records linked, {} failures",
                report.clusters_formed,
                report.masters_created,
                report.masters_merged,
                report.records_linked,
                report.failures.len()
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Everything [`run`](Self::run) does except writing
    pub async fn plan(&self) -> Result<ResolutionPlan, ResolveError> {
        let span = info_span!("resolve_plan", store = self.store.name());
        async {
            self.store
                .ping()
                .await
                .map_err(ResolveError::StoreUnavailable)?;

            let Analysis {
                records,
                clusters,
                mut report,
            } = self.analyze().await?;

            let canonical = self.canonicalize_all(&records, &clusters);
            for decision in &canonical {
                match decision {
                    Canonical::Commit {
                        conflict: Some(conflict),
                        ..
                    } => report.identifier_conflicts.push(conflict.clone()),
                    Canonical::Hold(conflict) => {
                        report.identifier_conflicts.push(conflict.clone());
                        report.held_for_review.push(conflict.members.clone());
                    }
                    Canonical::Commit { .. } => {}
                }
            }

            Ok(ResolutionPlan {
                clusters,
                canonical,
                report,
            })
        }
        .instrument(span)
        .await
    }

    /// Score a single pair of records, unresolved or not
    pub async fn score_pair(&self, a: &str, b: &str) -> Result<CandidatePair, ResolveError> {
        let fetch = |id: &str| {
            let id = id.to_string();
            async move {
                self.store
                    .get_record(&id)
                    .await
                    .map_err(read_error)?
                    .ok_or_else(|| ResolveError::Storage(StorageError::RecordNotFound(id.clone())))
            }
        };
        let record_a = fetch(a).await?;
        let record_b = fetch(b).await?;

        let authorships = self.store.authorships().await.map_err(read_error)?;
        let coauthors = CoauthorIndex::from_authorships(&authorships);
        let features = |r: &SourceRecord| {
            RecordFeatures::extract(r).with_linked_records(coauthors.co_author_records(&r.id))
        };

        let result = self.scorer.score(&features(&record_a), &features(&record_b));
        let key_a = self.blocking.key_for(&record_a);
        let block_key = if key_a.is_some() && key_a == self.blocking.key_for(&record_b) {
            key_a.unwrap_or_default()
        } else {
            String::new()
        };

        Ok(CandidatePair {
            pair: PairKey::new(a, b),
            block_key,
            score: result.score,
            decision: result.decision,
            vector: result.vector,
        })
    }

    async fn analyze(&self) -> Result<Analysis, ResolveError> {
        let records: Vec<SourceRecord> = self
            .store
            .unresolved_records()
            .await
            .map_err(read_error)?
            .into_iter()
            .filter(SourceRecord::is_unresolved)
            .collect();
        let authorships = self.store.authorships().await.map_err(read_error)?;
        let coauthors = CoauthorIndex::from_authorships(&authorships);

        let mut report = RunReport {
            records_considered: records.len(),
            ..RunReport::default()
        };
        info!(
            "Resolving {} unresolved records ({} authorship rows)",
            records.len(),
            authorships.len()
        );
        if coauthors.is_empty() {
            debug!("No authorship rows; co-author signal uses names only");
        } else {
            debug!(
                "Co-author index spans {} publications",
                coauthors.publication_count()
            );
        }

        let nameless: Vec<&str> = records
            .iter()
            .filter(|r| r.full_name().is_empty())
            .map(|r| r.id.as_str())
            .collect();
        if !nameless.is_empty() {
            warn!(
                "{} records have no name and will resolve on their own: {:?}",
                nameless.len(),
                nameless
            );
        }
        report.records_without_name = nameless.len();

        let partition = self.blocking.partition(&records);
        report.records_unblocked = partition.unblocked.len();
        report.records_deferred = partition.deferred.len();
        report.blocks_formed = partition.blocks.len();
        report.blocks_skipped = partition.skipped.clone();

        let features: Arc<HashMap<String, RecordFeatures>> = Arc::new(
            records
                .iter()
                .map(|r| {
                    let f = RecordFeatures::extract(r)
                        .with_linked_records(coauthors.co_author_records(&r.id));
                    (r.id.clone(), f)
                })
                .collect(),
        );

        let pairs = self.score_blocks(partition.blocks, features).await?;
        report.pairs_scored = pairs.len();

        let deferred: HashSet<&str> =
            partition.deferred.iter().map(String::as_str).collect();
        let mut graph = CandidateGraph::new(
            records
                .iter()
                .map(|r| r.id.as_str())
                .filter(|id| !deferred.contains(id)),
        );
        for candidate in pairs.iter().filter(|c| c.decision.is_match()) {
            if graph.add_edge(&candidate.pair, candidate.score) {
                report.pairs_accepted += 1;
            }
        }

        debug!(
            "Candidate graph has {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        let clusters = graph.clusters();
        report.clusters_formed = clusters.len();
        info!(
            "Scored {} pairs in {} blocks, accepted {}, formed {} clusters",
            report.pairs_scored,
            report.blocks_formed,
            report.pairs_accepted,
            report.clusters_formed
        );

        if self.config.runtime.record_audit {
            report.audit = Some(pairs);
        }

        Ok(Analysis {
            records: records.into_iter().map(|r| (r.id.clone(), r)).collect(),
            clusters,
            report,
        })
    }

    /// Score every block on the blocking pool; output sorted by block key then pair
    async fn score_blocks(
        &self,
        blocks: Vec<Block>,
        features: Arc<HashMap<String, RecordFeatures>>,
    ) -> Result<Vec<CandidatePair>, ResolveError> {
        let semaphore = Arc::new(Semaphore::new(self.config.runtime.max_concurrent_blocks));
        let mut handles = Vec::with_capacity(blocks.len());

        for block in blocks {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ResolveError::Worker(e.to_string()))?;
            let index = self.blocking.clone();
            let scorer = self.scorer.clone();
            let features = features.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                score_block(&block, &index, &scorer, &features)
            }));
        }

        let mut pairs = Vec::new();
        for handle in handles {
            let block_pairs = handle
                .await
                .map_err(|e| ResolveError::Worker(e.to_string()))?;
            pairs.extend(block_pairs);
        }
        pairs.sort_by(|x, y| {
            x.block_key
                .cmp(&y.block_key)
                .then_with(|| x.pair.cmp(&y.pair))
        });
        Ok(pairs)
    }

    fn canonicalize_all(
        &self,
        records: &HashMap<String, SourceRecord>,
        clusters: &[Cluster],
    ) -> Vec<Canonical> {
        clusters
            .iter()
            .map(|cluster| {
                let members: Vec<&SourceRecord> = cluster
                    .members
                    .iter()
                    .filter_map(|id| records.get(id))
                    .collect();
                canonicalize(cluster, &members, self.config.merge.on_identifier_conflict)
            })
            .collect()
    }

    async fn write(&self, analysis: Analysis) -> RunReport {
        let Analysis {
            records,
            clusters,
            mut report,
        } = analysis;

        let writer = Arc::new(MergeWriter::new(
            self.store.clone(),
            self.config.merge.retry_config(),
        ));

        // Clusters sharing an identifier commit in lead order on one task, so
        // the same one creates the master on every run.
        let mut groups: Vec<Vec<ClusterPlan>> = Vec::new();
        let mut by_identifier: BTreeMap<String, Vec<ClusterPlan>> = BTreeMap::new();
        for decision in self.canonicalize_all(&records, &clusters) {
            let plan = match decision {
                Canonical::Hold(conflict) => {
                    report.held_for_review.push(conflict.members.clone());
                    report.identifier_conflicts.push(conflict);
                    continue;
                }
                Canonical::Commit { plan, conflict } => {
                    if let Some(conflict) = conflict {
                        report.identifier_conflicts.push(conflict);
                    }
                    plan
                }
            };
            match plan.external_identifier.clone() {
                Some(identifier) => by_identifier.entry(identifier).or_default().push(plan),
                None => groups.push(vec![plan]),
            }
        }
        for (identifier, group) in by_identifier {
            if group.len() > 1 {
                debug!(
                    "{} clusters share identifier {}; committing in order",
                    group.len(),
                    identifier
                );
            }
            groups.push(group);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.runtime.max_concurrent_writes));
        let mut handles = Vec::with_capacity(groups.len());
        for group in groups {
            let writer = writer.clone();
            let semaphore = semaphore.clone();
            let members: Vec<Vec<String>> = group.iter().map(|p| p.members.clone()).collect();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let mut outcomes = Vec::with_capacity(group.len());
                for plan in &group {
                    outcomes.push(writer.commit(plan).await);
                }
                outcomes
            });
            handles.push((members, handle));
        }

        for (members, handle) in handles {
            match handle.await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        record_outcome(&mut report, outcome);
                    }
                }
                Err(e) => {
                    for members in members {
                        warn!("Commit task for cluster {:?} failed: {}", members, e);
                        report.failures.push(ClusterFailure {
                            members,
                            failure: ClusterFailureKind::Persistence {
                                message: format!("commit task failed: {}", e),
                            },
                        });
                    }
                }
            }
        }

        report.linked.sort_by(|x, y| x.members.cmp(&y.members));
        report.failures.sort_by(|x, y| x.members.cmp(&y.members));
        report.identifier_conflicts.sort_by(|x, y| x.members.cmp(&y.members));
        report.held_for_review.sort();
        debug!(
            "{} clusters linked, {} failed, {} held for review",
            report.linked.len(),
            report.failures.len(),
            report.held_for_review.len()
        );
        report
    }
}

fn record_outcome(report: &mut RunReport, outcome: CommitOutcome) {
    match outcome {
        CommitOutcome::Linked(linked) => {
            match linked.outcome {
                MasterOutcome::Created => report.masters_created += 1,
                MasterOutcome::MergedIntoExisting => report.masters_merged += 1,
            }
            report.records_linked += linked.members.len();
            report.linked.push(linked);
        }
        CommitOutcome::Failed(failure) => report.failures.push(failure),
    }
}

fn score_block(
    block: &Block,
    index: &BlockingIndex,
    scorer: &PairScorer,
    features: &HashMap<String, RecordFeatures>,
) -> Vec<CandidatePair> {
    let pairs = index.candidate_pairs(block);
    debug!("Scoring {} pairs in block '{}'", pairs.len(), block.key);

    pairs
        .into_iter()
        .filter_map(|pair| {
            let a = features.get(&pair.a)?;
            let b = features.get(&pair.b)?;
            let result = scorer.score(a, b);
            Some(CandidatePair {
                pair,
                block_key: block.key.clone(),
                score: result.score,
                decision: result.decision,
                vector: result.vector,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentifierConflictPolicy;
    use crate::models::{RecordSource, SourceRecordBuilder};
    use crate::store::{FaultyStore, InMemoryStore};

    fn store(records: Vec<SourceRecord>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for record in records {
            store.insert_record(record).unwrap();
        }
        store
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ResolverConfig::default();
        config.scoring.accept_threshold = 1.5;
        let result = Resolver::new(config, store(vec![]));
        assert!(matches!(result, Err(ResolveError::Config(_))));
    }

    #[tokio::test]
    async fn test_plan_does_not_write() {
        let store = store(vec![
            SourceRecordBuilder::new("a", RecordSource::Orcid, "Ana", "Garcia")
                .identifier("0000-0001")
                .build(),
            SourceRecordBuilder::new("b", RecordSource::Dblp, "Ana", "Garcia")
                .identifier("0000-0001")
                .build(),
        ]);
        let resolver = Resolver::new(ResolverConfig::default(), store.clone()).unwrap();

        let plan = resolver.plan().await.unwrap();
        assert_eq!(plan.clusters.len(), 1);
        assert_eq!(plan.clusters[0].members, vec!["a", "b"]);
        assert!(matches!(&plan.canonical[0], Canonical::Commit { plan, .. }
            if plan.external_identifier.as_deref() == Some("0000-0001")));
        assert_eq!(store.master_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_plan_reports_held_conflicts() {
        let store = store(vec![
            SourceRecordBuilder::new("a", RecordSource::Orcid, "Ana", "Garcia")
                .identifier("0000-0001")
                .build(),
            SourceRecordBuilder::new("b", RecordSource::Dblp, "Ana", "Garcia")
                .identifier("0000-0002")
                .build(),
            SourceRecordBuilder::new("c", RecordSource::Dblp, "", "").build(),
        ]);
        let mut config = ResolverConfig::default();
        config.merge.on_identifier_conflict = IdentifierConflictPolicy::HoldForReview;
        let resolver = Resolver::new(config, store).unwrap();

        let plan = resolver.plan().await.unwrap();
        assert_eq!(plan.report.held_for_review, vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(plan.report.identifier_conflicts.len(), 1);
        assert_eq!(plan.report.records_unblocked, 1);
        assert_eq!(plan.report.records_without_name, 1);
        assert_eq!(plan.clusters.len(), 2);
    }

    #[tokio::test]
    async fn test_score_pair_uses_authorships() {
        let store = store(vec![
            SourceRecordBuilder::new("a", RecordSource::Orcid, "Ana", "Garcia").build(),
            SourceRecordBuilder::new("b", RecordSource::Dblp, "Ana", "Garcia").build(),
            SourceRecordBuilder::new("c", RecordSource::Dblp, "Luis", "Perez").build(),
        ]);
        for (record, publication) in [("a", "p1"), ("c", "p1"), ("b", "p2"), ("c", "p2")] {
            store
                .add_authorship(crate::models::Authorship::new(record, publication))
                .unwrap();
        }
        let resolver = Resolver::new(ResolverConfig::default(), store).unwrap();

        let pair = resolver.score_pair("b", "a").await.unwrap();
        assert_eq!(pair.pair, PairKey::new("a", "b"));
        assert_eq!(pair.block_key, "garcia_a");
        assert_eq!(
            pair.vector.similarity(crate::models::SignalKind::CoAuthors),
            1.0
        );
        assert!(pair.decision.is_match());
    }

    #[tokio::test]
    async fn test_score_pair_missing_record() {
        let resolver = Resolver::new(ResolverConfig::default(), store(vec![])).unwrap();
        let result = resolver.score_pair("x", "y").await;
        assert!(matches!(
            result,
            Err(ResolveError::Storage(StorageError::RecordNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let faulty = Arc::new(FaultyStore::new(store(vec![
            SourceRecordBuilder::new("a", RecordSource::Orcid, "Ana", "Garcia").build(),
        ])));
        faulty.set_unreachable(true);
        let resolver = Resolver::new(ResolverConfig::default(), faulty.clone()).unwrap();

        assert!(matches!(
            resolver.run().await,
            Err(ResolveError::StoreUnavailable(_))
        ));
        assert_eq!(faulty.commit_calls(), 0);
    }
}
