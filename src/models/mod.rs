//! Core data models for author records, master authors and resolution runs.

mod record;
mod resolution;

pub use record::{
    Authorship, MasterAuthor, MasterId, RecordSource, ResolutionState, SourceRecord,
    SourceRecordBuilder,
};
pub use resolution::{
    CandidatePair, Cluster, ClusterFailure, ClusterFailureKind, Decision, IdentifierConflict,
    LinkedCluster, MasterOutcome, PairKey, RunReport, SignalKind, SignalScore, SimilarityVector,
    SkippedBlock,
};
