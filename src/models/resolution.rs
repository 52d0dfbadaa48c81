//! Transient artifacts of a resolution run: similarity vectors, candidate pairs,
//! clusters and the run report handed back to operational tooling.

use serde::{Deserialize, Serialize};

use super::record::MasterId;

/// One similarity signal contributing to a pair score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Identifier,
    Publications,
    Name,
    CoAuthors,
    Affiliation,
    Keywords,
}

impl SignalKind {
    /// Every signal, in the fixed order used for scoring and reporting
    pub const ALL: [SignalKind; 6] = [
        SignalKind::Identifier,
        SignalKind::Publications,
        SignalKind::Name,
        SignalKind::CoAuthors,
        SignalKind::Affiliation,
        SignalKind::Keywords,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            SignalKind::Identifier => "identifier",
            SignalKind::Publications => "publications",
            SignalKind::Name => "name",
            SignalKind::CoAuthors => "co_authors",
            SignalKind::Affiliation => "affiliation",
            SignalKind::Keywords => "keywords",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Raw similarity, evidence confidence and resulting dynamic weight of one signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub kind: SignalKind,
    pub similarity: f64,
    pub confidence: f64,
    pub weight: f64,
}

/// Per-pair set of signal scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityVector {
    pub signals: Vec<SignalScore>,
}

impl SimilarityVector {
    /// Look up the score for one signal
    pub fn get(&self, kind: SignalKind) -> Option<&SignalScore> {
        self.signals.iter().find(|s| s.kind == kind)
    }

    /// Similarity of one signal, 0.0 when absent
    pub fn similarity(&self, kind: SignalKind) -> f64 {
        self.get(kind).map(|s| s.similarity).unwrap_or(0.0)
    }
}

/// Accept/reject outcome for a candidate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Match,
    NoMatch,
}

impl Decision {
    pub fn is_match(&self) -> bool {
        matches!(self, Decision::Match)
    }
}

/// Unordered pair of record ids produced by blocking.
///
/// The constructor orders the ids so `(a, b)` and `(b, a)` are the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub a: String,
    pub b: String,
}

impl PairKey {
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        let (x, y) = (x.into(), y.into());
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// A scored candidate pair, kept for audit when requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub pair: PairKey,
    pub block_key: String,
    pub score: f64,
    pub decision: Decision,
    pub vector: SimilarityVector,
}

/// A connected component of the candidate graph: mutually reachable record ids.
///
/// Members are sorted, so the first member is a stable lead id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<String>,
}

impl Cluster {
    pub fn new(mut members: Vec<String>) -> Self {
        members.sort();
        members.dedup();
        Self { members }
    }

    pub fn lead(&self) -> &str {
        self.members.first().map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }
}

/// A block skipped because it exceeded the size ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedBlock {
    pub key: String,
    pub size: usize,
}

/// A cluster whose members carry more than one distinct external identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierConflict {
    pub members: Vec<String>,
    pub identifiers: Vec<String>,
    /// Identifier the cluster was linked under, `None` when held for review
    pub chosen: Option<String>,
}

/// Why a cluster could not be committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterFailureKind {
    /// Identifier race persisted past the retry budget
    RaceRetriesExhausted { attempts: u32 },
    /// Any other persistence error; the cluster was rolled back
    Persistence { message: String },
}

/// A cluster that failed to commit; nothing in it was linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFailure {
    pub members: Vec<String>,
    pub failure: ClusterFailureKind,
}

/// How the master of a committed cluster was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterOutcome {
    Created,
    MergedIntoExisting,
}

/// A cluster that was committed and linked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCluster {
    pub members: Vec<String>,
    pub master_id: MasterId,
    pub outcome: MasterOutcome,
}

/// Counters and reports produced by one resolution run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub records_considered: usize,
    pub records_without_name: usize,
    pub records_unblocked: usize,
    /// Records in skipped blocks, left unresolved
    pub records_deferred: usize,
    pub blocks_formed: usize,
    pub blocks_skipped: Vec<SkippedBlock>,
    pub pairs_scored: usize,
    pub pairs_accepted: usize,
    pub clusters_formed: usize,
    pub masters_created: usize,
    pub masters_merged: usize,
    pub records_linked: usize,
    pub identifier_conflicts: Vec<IdentifierConflict>,
    pub held_for_review: Vec<Vec<String>>,
    pub linked: Vec<LinkedCluster>,
    pub failures: Vec<ClusterFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<Vec<CandidatePair>>,
}

impl RunReport {
    /// Whether any cluster failed to commit
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_unordered() {
        assert_eq!(PairKey::new("b", "a"), PairKey::new("a", "b"));
        let key = PairKey::new("z", "m");
        assert_eq!(key.a, "m");
        assert_eq!(key.b, "z");
    }

    #[test]
    fn test_cluster_sorts_and_dedups_members() {
        let cluster = Cluster::new(vec!["c".into(), "a".into(), "c".into(), "b".into()]);
        assert_eq!(cluster.members, vec!["a", "b", "c"]);
        assert_eq!(cluster.lead(), "a");
        assert!(!cluster.is_singleton());
    }

    #[test]
    fn test_similarity_vector_lookup() {
        let vector = SimilarityVector {
            signals: vec![SignalScore {
                kind: SignalKind::Name,
                similarity: 0.9,
                confidence: 1.0,
                weight: 1.0,
            }],
        };
        assert_eq!(vector.similarity(SignalKind::Name), 0.9);
        assert_eq!(vector.similarity(SignalKind::Identifier), 0.0);
    }

    #[test]
    fn test_failure_kind_serializes_tagged() {
        let json = serde_json::to_string(&ClusterFailureKind::RaceRetriesExhausted { attempts: 3 })
            .unwrap();
        assert_eq!(json, r#"{"kind":"race_retries_exhausted","attempts":3}"#);
    }
}
