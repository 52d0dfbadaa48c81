//! Similarity signals between two author records.
//!
//! Every signal is a pure function returning a score in `[0, 1]` and never
//! fails on empty input. Attribute extraction happens once per record per run
//! in [`RecordFeatures::extract`], so the per-pair work is set arithmetic and
//! a handful of string comparisons.

use std::collections::HashSet;

use strsim::jaro_winkler;

use crate::models::SourceRecord;
use crate::utils::{is_initial, normalize_whitespace, phrase_set, token_set};

/// Prefix of co-author tokens derived from shared authorships
pub const RECORD_TOKEN_PREFIX: &str = "record:";

/// Token standing for another record in a co-author set
pub fn record_token(record_id: &str) -> String {
    format!("{RECORD_TOKEN_PREFIX}{record_id}")
}

/// Pre-computed attribute extracts of one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFeatures {
    pub id: String,
    /// Lowercased full name followed by past names, blanks removed
    pub names: Vec<String>,
    /// How complete the primary name is, in `[0, 1]`
    pub name_quality: f64,
    pub identifier: Option<String>,
    pub publications: HashSet<String>,
    pub co_authors: HashSet<String>,
    pub affiliation_tokens: HashSet<String>,
    pub keywords: HashSet<String>,
}

impl RecordFeatures {
    /// Extract the comparable attributes of a record
    pub fn extract(record: &SourceRecord) -> Self {
        let names = std::iter::once(record.full_name())
            .chain(record.past_names.iter().cloned())
            .map(|n| normalize_whitespace(&n))
            .filter(|n| !n.is_empty())
            .fold(Vec::new(), |mut acc, n| {
                if !acc.contains(&n) {
                    acc.push(n);
                }
                acc
            });

        Self {
            id: record.id.clone(),
            name_quality: name_quality(record),
            names,
            identifier: record.identifier().map(str::to_string),
            publications: phrase_set(&record.publication_titles),
            co_authors: record
                .co_authors
                .iter()
                .map(|n| normalize_whitespace(n))
                .filter(|n| !n.is_empty())
                .collect(),
            affiliation_tokens: token_set(&record.affiliations),
            keywords: phrase_set(&record.keywords),
        }
    }

    /// Add co-author identities of records sharing a publication with this one
    pub fn with_linked_records<I>(mut self, record_ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for id in record_ids {
            if id.as_ref() != self.id {
                self.co_authors.insert(record_token(id.as_ref()));
            }
        }
        self
    }
}

/// Completeness of a record's primary name.
///
/// 1.0 for a full given and family name, 0.6 when the given name is only
/// initials, 0.3 for a bare family (or given) name, 0.0 with no name at all.
/// A record known only by past names gets 0.5.
pub fn name_quality(record: &SourceRecord) -> f64 {
    let given = record.given_name.trim();
    let family = record.family_name.trim();

    match (given.is_empty(), family.is_empty()) {
        (false, false) => {
            if given.split_whitespace().all(is_initial) {
                0.6
            } else {
                1.0
            }
        }
        (true, false) | (false, true) => 0.3,
        (true, true) => {
            if record.past_names.iter().any(|n| !n.trim().is_empty()) {
                0.5
            } else {
                0.0
            }
        }
    }
}

/// Best Jaro-Winkler similarity over the cross product of both name lists.
///
/// Names are expected lowercased; 0.0 when either side has no name.
pub fn name_similarity(a: &[String], b: &[String]) -> f64 {
    let mut best: f64 = 0.0;
    for x in a.iter().filter(|n| !n.is_empty()) {
        for y in b.iter().filter(|n| !n.is_empty()) {
            best = best.max(jaro_winkler(x, y));
            if best >= 1.0 {
                return 1.0;
            }
        }
    }
    best
}

/// Jaccard index of two sets; 0.0 when either is empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Co-author sets of a pair with the two candidates removed from each other's set
pub fn co_author_sets(a: &RecordFeatures, b: &RecordFeatures) -> (HashSet<String>, HashSet<String>) {
    let own = [record_token(&a.id), record_token(&b.id)];
    let strip = |set: &HashSet<String>| -> HashSet<String> {
        set.iter().filter(|t| !own.contains(t)).cloned().collect()
    };
    (strip(&a.co_authors), strip(&b.co_authors))
}

/// 1.0 only when both sides carry the same non-empty identifier
pub fn identifier_similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a.map(str::trim), b.map(str::trim)) {
        (Some(x), Some(y)) if !x.is_empty() && x == y => 1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordSource, SourceRecordBuilder};

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_name_similarity_uses_best_alias() {
        let a = vec!["ana garcia lopez".to_string(), "ana garcia".to_string()];
        let b = vec!["ana garcia".to_string()];
        assert_eq!(name_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_name_similarity_empty_is_zero() {
        let a: Vec<String> = Vec::new();
        let b = vec!["john smith".to_string()];
        assert_eq!(name_similarity(&a, &b), 0.0);
        assert_eq!(name_similarity(&[String::new()], &[String::new()]), 0.0);
    }

    #[test]
    fn test_name_similarity_close_names() {
        let a = vec!["john smith".to_string()];
        let b = vec!["jon smith".to_string()];
        let c = vec!["gjorgji madjarov".to_string()];
        assert!(name_similarity(&a, &b) > 0.9);
        assert!(name_similarity(&a, &c) < 0.6);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&set(&["a"]), &set(&["a"])), 1.0);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
        assert_eq!(jaccard(&set(&["a"]), &set(&[])), 0.0);
    }

    #[test]
    fn test_identifier_similarity() {
        assert_eq!(identifier_similarity(Some("0000-0001"), Some("0000-0001")), 1.0);
        assert_eq!(identifier_similarity(Some("0000-0001"), Some("0000-0002")), 0.0);
        assert_eq!(identifier_similarity(Some(""), Some("")), 0.0);
        assert_eq!(identifier_similarity(None, None), 0.0);
    }

    #[test]
    fn test_name_quality_levels() {
        let full = SourceRecordBuilder::new("1", RecordSource::Dblp, "John", "Smith").build();
        let initial = SourceRecordBuilder::new("2", RecordSource::Dblp, "J. A.", "Smith").build();
        let family = SourceRecordBuilder::new("3", RecordSource::Dblp, "", "Smith").build();
        let alias = SourceRecordBuilder::new("4", RecordSource::Dblp, "", "")
            .past_name("John Smith")
            .build();
        let none = SourceRecordBuilder::new("5", RecordSource::Dblp, " ", "").build();

        assert_eq!(name_quality(&full), 1.0);
        assert_eq!(name_quality(&initial), 0.6);
        assert_eq!(name_quality(&family), 0.3);
        assert_eq!(name_quality(&alias), 0.5);
        assert_eq!(name_quality(&none), 0.0);
    }

    #[test]
    fn test_extract_features() {
        let record = SourceRecordBuilder::new("r1", RecordSource::Orcid, "John", "Smith")
            .identifier(" 0000-0001 ")
            .past_name("JOHN  SMITH")
            .past_name("Johnny Smith")
            .co_author("Jane Doe")
            .affiliation("University of Skopje")
            .keyword("Machine Learning")
            .build();

        let features = RecordFeatures::extract(&record).with_linked_records(["r1", "r7"]);
        assert_eq!(features.names, vec!["john smith", "johnny smith"]);
        assert_eq!(features.identifier.as_deref(), Some("0000-0001"));
        assert!(features.co_authors.contains("jane doe"));
        assert!(features.co_authors.contains("record:r7"));
        assert!(!features.co_authors.contains("record:r1"));
        assert_eq!(features.affiliation_tokens, set(&["university", "skopje"]));
        assert_eq!(features.keywords, set(&["machine learning"]));
    }

    #[test]
    fn test_co_author_sets_exclude_candidates() {
        let a = RecordFeatures::extract(
            &SourceRecordBuilder::new("a", RecordSource::Dblp, "A", "X").build(),
        )
        .with_linked_records(["b", "c"]);
        let b = RecordFeatures::extract(
            &SourceRecordBuilder::new("b", RecordSource::Dblp, "B", "X").build(),
        )
        .with_linked_records(["a", "c"]);

        let (sa, sb) = co_author_sets(&a, &b);
        assert_eq!(sa, set(&["record:c"]));
        assert_eq!(sb, set(&["record:c"]));
        assert_eq!(jaccard(&sa, &sb), 1.0);
    }
}
