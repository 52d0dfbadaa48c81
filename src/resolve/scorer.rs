//! Pairwise scorer with dynamic, confidence-weighted aggregation.
//!
//! Each signal gets `base_weight × confidence`; a signal whose similarity is
//! under the low-evidence floor has its confidence cut by the penalty factor
//! first. The raw weights are normalized to sum to one and the composite score
//! is the weighted sum of similarities, on a `[0, 1]` scale.

use crate::config::ScoringConfig;
use crate::models::{Decision, SignalKind, SignalScore, SimilarityVector};

use super::signals::{co_author_sets, identifier_similarity, jaccard, name_similarity, RecordFeatures};

/// Confidence of a set signal when both sides carry data
fn base_confidence(kind: SignalKind) -> f64 {
    match kind {
        SignalKind::Identifier => 1.0,
        SignalKind::Publications => 0.9,
        SignalKind::CoAuthors => 0.8,
        SignalKind::Keywords => 0.7,
        SignalKind::Affiliation => 0.6,
        // derived from name quality instead
        SignalKind::Name => 1.0,
    }
}

/// Score and decision for one pair
#[derive(Debug, Clone, PartialEq)]
pub struct PairScore {
    pub score: f64,
    pub decision: Decision,
    pub vector: SimilarityVector,
}

#[derive(Debug, Clone)]
pub struct PairScorer {
    config: ScoringConfig,
}

impl PairScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a pair of records
    pub fn score(&self, a: &RecordFeatures, b: &RecordFeatures) -> PairScore {
        let (co_a, co_b) = co_author_sets(a, b);

        let raw = [
            (
                SignalKind::Identifier,
                identifier_similarity(a.identifier.as_deref(), b.identifier.as_deref()),
                1.0,
            ),
            (
                SignalKind::Publications,
                jaccard(&a.publications, &b.publications),
                self.set_confidence(SignalKind::Publications, a.publications.len(), b.publications.len()),
            ),
            (
                SignalKind::Name,
                name_similarity(&a.names, &b.names),
                (a.name_quality + b.name_quality) / 2.0,
            ),
            (
                SignalKind::CoAuthors,
                jaccard(&co_a, &co_b),
                self.set_confidence(SignalKind::CoAuthors, co_a.len(), co_b.len()),
            ),
            (
                SignalKind::Affiliation,
                jaccard(&a.affiliation_tokens, &b.affiliation_tokens),
                self.set_confidence(
                    SignalKind::Affiliation,
                    a.affiliation_tokens.len(),
                    b.affiliation_tokens.len(),
                ),
            ),
            (
                SignalKind::Keywords,
                jaccard(&a.keywords, &b.keywords),
                self.set_confidence(SignalKind::Keywords, a.keywords.len(), b.keywords.len()),
            ),
        ];

        self.aggregate(&raw)
    }

    /// Full confidence with data on both sides, half with one side, near zero with none
    fn set_confidence(&self, kind: SignalKind, len_a: usize, len_b: usize) -> f64 {
        match (len_a > 0, len_b > 0) {
            (true, true) => base_confidence(kind),
            (true, false) | (false, true) => base_confidence(kind) * 0.5,
            (false, false) => self.config.empty_evidence_confidence,
        }
    }

    /// Combine `(signal, similarity, confidence)` triples into a score
    pub fn aggregate(&self, raw: &[(SignalKind, f64, f64)]) -> PairScore {
        let mut signals: Vec<SignalScore> = raw
            .iter()
            .map(|&(kind, similarity, confidence)| {
                let similarity = similarity.clamp(0.0, 1.0);
                let mut confidence = confidence.clamp(0.0, 1.0);
                if similarity < self.config.low_evidence_floor {
                    confidence *= self.config.low_evidence_penalty;
                }
                SignalScore {
                    kind,
                    similarity,
                    confidence,
                    weight: self.config.weights.get(kind) * confidence,
                }
            })
            .collect();

        let total: f64 = signals.iter().map(|s| s.weight).sum();
        if total <= 0.0 {
            for s in &mut signals {
                s.weight = 0.0;
            }
            return PairScore {
                score: 0.0,
                decision: Decision::NoMatch,
                vector: SimilarityVector { signals },
            };
        }

        for s in &mut signals {
            s.weight /= total;
        }
        let score = signals
            .iter()
            .map(|s| s.similarity * s.weight)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let decision = if score >= self.config.accept_threshold {
            Decision::Match
        } else {
            Decision::NoMatch
        };

        PairScore {
            score,
            decision,
            vector: SimilarityVector { signals },
        }
    }
}
