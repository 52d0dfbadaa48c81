//! Co-authorship adjacency, materialized once per run from authorship rows.

use std::collections::{BTreeSet, HashMap};

use crate::models::Authorship;

/// record → publications and publication → records maps
#[derive(Debug, Clone, Default)]
pub struct CoauthorIndex {
    publications_by_record: HashMap<String, BTreeSet<String>>,
    records_by_publication: HashMap<String, BTreeSet<String>>,
}

impl CoauthorIndex {
    pub fn from_authorships<'a, I>(authorships: I) -> Self
    where
        I: IntoIterator<Item = &'a Authorship>,
    {
        let mut index = Self::default();
        for row in authorships {
            index
                .publications_by_record
                .entry(row.record_id.clone())
                .or_default()
                .insert(row.publication_id.clone());
            index
                .records_by_publication
                .entry(row.publication_id.clone())
                .or_default()
                .insert(row.record_id.clone());
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.publications_by_record.is_empty()
    }

    pub fn publication_count(&self) -> usize {
        self.records_by_publication.len()
    }

    /// Other records that share at least one publication with `record_id`
    pub fn co_author_records(&self, record_id: &str) -> BTreeSet<String> {
        let Some(publications) = self.publications_by_record.get(record_id) else {
            return BTreeSet::new();
        };

        publications
            .iter()
            .filter_map(|p| self.records_by_publication.get(p))
            .flatten()
            .filter(|r| r.as_str() != record_id)
            .cloned()
            .collect()
    }
}
