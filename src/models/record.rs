//! Source-side author records and the canonical master authors they resolve to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The bibliographic source a record was scraped from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Orcid,
    Dblp,
    OpenAlex,
    #[serde(rename = "semantic", alias = "semanticscholar")]
    SemanticScholar,
    CrossRef,
    #[serde(untagged)]
    Other(String),
}

impl RecordSource {
    /// Returns the display name of the source
    pub fn name(&self) -> &str {
        match self {
            RecordSource::Orcid => "ORCID",
            RecordSource::Dblp => "DBLP",
            RecordSource::OpenAlex => "OpenAlex",
            RecordSource::SemanticScholar => "Semantic Scholar",
            RecordSource::CrossRef => "CrossRef",
            RecordSource::Other(s) => s,
        }
    }

    /// Returns the short source identifier
    pub fn id(&self) -> &str {
        match self {
            RecordSource::Orcid => "orcid",
            RecordSource::Dblp => "dblp",
            RecordSource::OpenAlex => "openalex",
            RecordSource::SemanticScholar => "semantic",
            RecordSource::CrossRef => "crossref",
            RecordSource::Other(s) => s,
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolution state of a source record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionState {
    #[default]
    Unresolved,
    Linked,
}

/// Identifier of a canonical master author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterId(Uuid);

impl MasterId {
    /// Creates a new random master ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

}

impl Default for MasterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MasterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One author mention from one source.
///
/// Records are created by ingestion and only ever mutated by the merge writer,
/// which sets `master_id` and flips `state` to [`ResolutionState::Linked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Stable identifier, unique across all sources
    pub id: String,

    /// Source the record was scraped from
    pub source: RecordSource,

    /// Given name(s), possibly only initials
    #[serde(default)]
    pub given_name: String,

    /// Family name
    #[serde(default)]
    pub family_name: String,

    /// Authoritative external identifier (e.g. ORCID iD)
    #[serde(default)]
    pub external_identifier: Option<String>,

    /// Previously used names and aliases
    #[serde(default)]
    pub past_names: Vec<String>,

    /// Affiliation strings
    #[serde(default)]
    pub affiliations: Vec<String>,

    /// Co-author display names
    #[serde(default)]
    pub co_authors: Vec<String>,

    /// Titles of publications attributed to this record
    #[serde(default)]
    pub publication_titles: Vec<String>,

    /// Subject keywords
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Resolution state
    #[serde(default)]
    pub state: ResolutionState,

    /// Master author this record is linked to, once resolved
    #[serde(default)]
    pub master_id: Option<MasterId>,
}

impl SourceRecord {
    /// Create a new unresolved record with required fields
    pub fn new(id: String, source: RecordSource, given_name: String, family_name: String) -> Self {
        Self {
            id,
            source,
            given_name,
            family_name,
            external_identifier: None,
            past_names: Vec::new(),
            affiliations: Vec::new(),
            co_authors: Vec::new(),
            publication_titles: Vec::new(),
            keywords: Vec::new(),
            state: ResolutionState::Unresolved,
            master_id: None,
        }
    }

    /// Returns "given family" with surrounding whitespace removed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name.trim(), self.family_name.trim())
            .trim()
            .to_string()
    }

    /// Returns the external identifier when it is present and non-blank
    pub fn identifier(&self) -> Option<&str> {
        self.external_identifier
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Whether the record still takes part in resolution
    pub fn is_unresolved(&self) -> bool {
        self.state == ResolutionState::Unresolved && self.master_id.is_none()
    }
}

/// Builder for constructing SourceRecord objects
#[derive(Debug, Clone)]
pub struct SourceRecordBuilder {
    record: SourceRecord,
}

impl SourceRecordBuilder {
    /// Create a new builder with required fields
    pub fn new(
        id: impl Into<String>,
        source: RecordSource,
        given_name: impl Into<String>,
        family_name: impl Into<String>,
    ) -> Self {
        Self {
            record: SourceRecord::new(id.into(), source, given_name.into(), family_name.into()),
        }
    }

    /// Set the external identifier
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.record.external_identifier = Some(identifier.into());
        self
    }

    /// Add a past name or alias
    pub fn past_name(mut self, name: impl Into<String>) -> Self {
        self.record.past_names.push(name.into());
        self
    }

    /// Add an affiliation
    pub fn affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.record.affiliations.push(affiliation.into());
        self
    }

    /// Add a co-author name
    pub fn co_author(mut self, name: impl Into<String>) -> Self {
        self.record.co_authors.push(name.into());
        self
    }

    /// Add a publication title
    pub fn publication(mut self, title: impl Into<String>) -> Self {
        self.record.publication_titles.push(title.into());
        self
    }

    /// Add a keyword
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.record.keywords.push(keyword.into());
        self
    }

    /// Mark the record as already linked to a master
    pub fn linked_to(mut self, master_id: MasterId) -> Self {
        self.record.master_id = Some(master_id);
        self.record.state = ResolutionState::Linked;
        self
    }

    /// Build the SourceRecord
    pub fn build(self) -> SourceRecord {
        self.record
    }
}

/// One row of the authorship table: `record_id` authored `publication_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authorship {
    pub record_id: String,
    pub publication_id: String,
}

impl Authorship {
    pub fn new(record_id: impl Into<String>, publication_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            publication_id: publication_id.into(),
        }
    }
}

/// Canonical, deduplicated author entity.
///
/// `external_identifier`, when set, is unique across all masters in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterAuthor {
    pub id: MasterId,
    pub given_name: String,
    pub family_name: String,
    pub canonical_name: String,
    pub external_identifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MasterAuthor {
    /// Create a fresh master with a newly generated ID
    pub fn new(
        given_name: impl Into<String>,
        family_name: impl Into<String>,
        external_identifier: Option<String>,
    ) -> Self {
        let given_name = given_name.into();
        let family_name = family_name.into();
        let canonical_name = format!("{} {}", given_name.trim(), family_name.trim())
            .trim()
            .to_string();
        let now = Utc::now();

        Self {
            id: MasterId::new(),
            given_name,
            family_name,
            canonical_name,
            external_identifier,
            created_at: now,
            updated_at: now,
        }
    }

    /// Override the display name derived from given and family name
    pub fn with_canonical_name(mut self, canonical_name: impl Into<String>) -> Self {
        self.canonical_name = canonical_name.into();
        self
    }

    /// Adopt a candidate name when it is longer than the current canonical name.
    ///
    /// The longest name wins across merges; equal lengths keep the existing one.
    /// Returns whether the name changed, bumping `updated_at` if so.
    pub fn refresh_name(&mut self, given_name: &str, family_name: &str, canonical_name: &str) -> bool {
        if canonical_name.chars().count() <= self.canonical_name.chars().count() {
            return false;
        }
        self.given_name = given_name.to_string();
        self.family_name = family_name.to_string();
        self.canonical_name = canonical_name.to_string();
        self.updated_at = Utc::now();
        true
    }
}
