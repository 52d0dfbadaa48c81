//! Blocking index: partitions unresolved records into disjoint comparison groups.
//!
//! Pairwise cost inside a block is quadratic, so blocks over the configured
//! ceiling are skipped and reported instead of truncated.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::{BlockingConfig, BlockingPolicy};
use crate::models::{PairKey, SkippedBlock, SourceRecord};
use crate::utils::{first_initial, normalize_key, trigram_similarity};

/// A record's place in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMember {
    pub id: String,
    pub full_name: String,
}

/// A group of records sharing a blocking key, members sorted by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub key: String,
    pub members: Vec<BlockMember>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Result of partitioning the unresolved universe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPartition {
    /// Blocks within the ceiling, ordered by key
    pub blocks: Vec<Block>,
    /// Oversized blocks, ordered by key
    pub skipped: Vec<SkippedBlock>,
    /// Ids of records in skipped blocks; they stay unresolved
    pub deferred: Vec<String>,
    /// Ids of records that have no key (empty family name)
    pub unblocked: Vec<String>,
}

/// Exact blocking key: normalized family name plus the given name's first initial.
///
/// `None` when the family name normalizes to nothing.
pub fn exact_key(record: &SourceRecord) -> Option<String> {
    let family = normalize_key(&record.family_name);
    if family.is_empty() {
        return None;
    }
    let initial = first_initial(&record.given_name)
        .map(String::from)
        .unwrap_or_default();
    Some(format!("{}_{}", family, initial))
}

/// Key used by the name-similarity policy: the normalized family name alone.
///
/// Given names are left to the trigram pre-filter, so "Ana Maria Keller" and
/// "Maria Keller" share a block even though their initials differ.
pub fn family_key(record: &SourceRecord) -> Option<String> {
    Some(normalize_key(&record.family_name)).filter(|family| !family.is_empty())
}

/// Groups records into blocks and enumerates the candidate pairs inside them
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    config: BlockingConfig,
}

impl BlockingIndex {
    pub fn new(config: BlockingConfig) -> Self {
        Self { config }
    }

    /// Key of a record under the configured policy
    pub fn key_for(&self, record: &SourceRecord) -> Option<String> {
        match self.config.policy {
            BlockingPolicy::ExactKey => exact_key(record),
            BlockingPolicy::NameSimilarity => family_key(record),
        }
    }

    /// Partition records. Linked records are ignored.
    pub fn partition<'a, I>(&self, records: I) -> BlockPartition
    where
        I: IntoIterator<Item = &'a SourceRecord>,
    {
        let mut groups: BTreeMap<String, Vec<BlockMember>> = BTreeMap::new();
        let mut partition = BlockPartition::default();

        for record in records.into_iter().filter(|r| r.is_unresolved()) {
            match self.key_for(record) {
                Some(key) => groups.entry(key).or_default().push(BlockMember {
                    id: record.id.clone(),
                    full_name: record.full_name(),
                }),
                None => partition.unblocked.push(record.id.clone()),
            }
        }

        for (key, mut members) in groups {
            members.sort_by(|a, b| a.id.cmp(&b.id));
            if members.len() > self.config.max_block_size {
                warn!(
                    "Skipping oversized block '{}' ({} records, ceiling {})",
                    key,
                    members.len(),
                    self.config.max_block_size
                );
                partition.skipped.push(SkippedBlock {
                    key,
                    size: members.len(),
                });
                partition.deferred.extend(members.into_iter().map(|m| m.id));
                continue;
            }
            partition.blocks.push(Block { key, members });
        }

        partition.unblocked.sort();
        partition.deferred.sort();
        debug!(
            "Formed {} blocks, skipped {}, {} records without a key",
            partition.blocks.len(),
            partition.skipped.len(),
            partition.unblocked.len()
        );
        partition
    }

    /// Candidate pairs of one block, in stable order
    pub fn candidate_pairs(&self, block: &Block) -> Vec<PairKey> {
        let mut pairs = Vec::new();
        if block.len() < 2 || block.len() > self.config.max_block_size {
            return pairs;
        }

        for (i, a) in block.members.iter().enumerate() {
            for b in &block.members[i + 1..] {
                let keep = match self.config.policy {
                    BlockingPolicy::ExactKey => true,
                    BlockingPolicy::NameSimilarity => {
                        trigram_similarity(&a.full_name, &b.full_name)
                            > self.config.prefilter_threshold
                    }
                };
                if keep {
                    pairs.push(PairKey::new(a.id.as_str(), b.id.as_str()));
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MasterId, RecordSource, SourceRecordBuilder};

    fn record(id: &str, given: &str, family: &str) -> SourceRecord {
        SourceRecordBuilder::new(id, RecordSource::Dblp, given, family).build()
    }

    fn index(policy: BlockingPolicy, max_block_size: usize) -> BlockingIndex {
        BlockingIndex::new(BlockingConfig {
            policy,
            prefilter_threshold: 0.4,
            max_block_size,
        })
    }

    #[test]
    fn test_exact_key() {
        assert_eq!(exact_key(&record("1", "John", "O'Brien")), Some("obrien_j".to_string()));
        assert_eq!(exact_key(&record("2", "", "Smith")), Some("smith_".to_string()));
        assert_eq!(exact_key(&record("3", "John", "  ")), None);
    }

    #[test]
    fn test_partition_groups_and_excludes() {
        let linked = SourceRecordBuilder::new("4", RecordSource::Orcid, "John", "Smith")
            .linked_to(MasterId::new())
            .build();
        let records = vec![
            record("3", "J.", "Smith"),
            record("1", "John", "Smith"),
            record("2", "Jane", "Doe"),
            record("5", "Nobody", ""),
            linked,
        ];

        let partition = index(BlockingPolicy::ExactKey, 10).partition(&records);
        let keys: Vec<&str> = partition.blocks.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["doe_j", "smith_j"]);

        let smith = &partition.blocks[1];
        let ids: Vec<&str> = smith.members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(partition.unblocked, vec!["5"]);
    }

    #[test]
    fn test_small_block_has_no_pairs() {
        let records = vec![record("1", "John", "Smith")];
        let index = index(BlockingPolicy::ExactKey, 10);
        let partition = index.partition(&records);
        assert_eq!(partition.blocks.len(), 1);
        assert!(index.candidate_pairs(&partition.blocks[0]).is_empty());
    }

    #[test]
    fn test_oversized_block_is_skipped_and_reported() {
        let records: Vec<SourceRecord> = (0..4)
            .map(|i| record(&format!("r{}", i), "John", "Smith"))
            .collect();
        let partition = index(BlockingPolicy::ExactKey, 3).partition(&records);

        assert!(partition.blocks.is_empty());
        assert_eq!(
            partition.skipped,
            vec![SkippedBlock {
                key: "smith_j".to_string(),
                size: 4
            }]
        );
        assert_eq!(partition.deferred.len(), 4);
    }

    #[test]
    fn test_exact_pairs_are_all_pairs() {
        let records = vec![
            record("1", "John", "Smith"),
            record("2", "Jon", "Smith"),
            record("3", "J", "Smith"),
        ];
        let index = index(BlockingPolicy::ExactKey, 10);
        let partition = index.partition(&records);
        let pairs = index.candidate_pairs(&partition.blocks[0]);
        assert_eq!(
            pairs,
            vec![
                PairKey::new("1", "2"),
                PairKey::new("1", "3"),
                PairKey::new("2", "3")
            ]
        );
    }

    #[test]
    fn test_name_similarity_prefilter() {
        let records = vec![
            record("1", "John", "Smith"),
            record("2", "John A.", "Smith"),
            record("3", "Zoltan", "Smith"),
            record("4", "Wei", "Sun"),
        ];
        let index = index(BlockingPolicy::NameSimilarity, 10);
        let partition = index.partition(&records);
        let keys: Vec<&str> = partition.blocks.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["smith", "sun"]);

        let pairs = index.candidate_pairs(&partition.blocks[0]);
        assert_eq!(pairs, vec![PairKey::new("1", "2")]);
    }

    #[test]
    fn test_name_similarity_ignores_initials_in_key() {
        let records = vec![
            record("1", "Ana Maria", "Keller"),
            record("2", "Maria", "Keller"),
        ];
        let similarity = index(BlockingPolicy::NameSimilarity, 10);
        let partition = similarity.partition(&records);
        assert_eq!(partition.blocks.len(), 1);
        assert_eq!(partition.blocks[0].key, "keller");
        assert_eq!(
            similarity.candidate_pairs(&partition.blocks[0]),
            vec![PairKey::new("1", "2")]
        );

        let exact = index(BlockingPolicy::ExactKey, 10).partition(&records);
        assert_eq!(exact.blocks.len(), 2);
    }

    #[test]
    fn test_name_similarity_family_groups_stay_small() {
        // Many families sharing an initial must not collapse into one block.
        let mut records: Vec<SourceRecord> = (0..20)
            .map(|i| record(&format!("s{:02}", i), "John", &format!("S{}name", i)))
            .collect();
        records.push(record("dup_a", "John", "Smith"));
        records.push(record("dup_b", "John", "Smith"));

        let index = index(BlockingPolicy::NameSimilarity, 5);
        let partition = index.partition(&records);
        assert!(partition.skipped.is_empty());
        assert!(partition.deferred.is_empty());

        let smith = partition
            .blocks
            .iter()
            .find(|b| b.key == "smith")
            .expect("smith block");
        assert_eq!(
            index.candidate_pairs(smith),
            vec![PairKey::new("dup_a", "dup_b")]
        );
    }
}
