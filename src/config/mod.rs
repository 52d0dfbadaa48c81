//! Configuration management.
//!
//! Every tunable of the resolution engine lives in [`ResolverConfig`] and is
//! passed explicitly into each component; nothing is held in process-wide state.
//!
//! # Configuration File Format
//!
//! ```toml
//! [blocking]
//! policy = "exact_key"          # or "name_similarity"
//! prefilter_threshold = 0.4
//! max_block_size = 1000
//!
//! [scoring]
//! accept_threshold = 0.7
//! low_evidence_floor = 0.1
//! low_evidence_penalty = 0.1
//! empty_evidence_confidence = 0.01
//!
//! [scoring.weights]
//! identifier = 0.40
//! publications = 0.25
//! name = 0.15
//! co_authors = 0.10
//! affiliation = 0.05
//! keywords = 0.05
//!
//! [merge]
//! identifier_retry_attempts = 3
//! on_identifier_conflict = "keep_first"   # or "hold_for_review"
//!
//! [runtime]
//! max_concurrent_blocks = 8
//! max_concurrent_writes = 4
//! record_audit = false
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Any key can be overridden from the environment with the `AUTHOR_RESOLVER_`
//! prefix and `__` between sections, e.g. `AUTHOR_RESOLVER_SCORING__ACCEPT_THRESHOLD=0.8`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::SignalKind;
use crate::utils::RetryConfig;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "AUTHOR_RESOLVER";

/// Upper bound for the runtime concurrency limits
pub const MAX_CONCURRENCY: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// File name searched for by [`find_config_file`]
pub const CONFIG_FILE_NAME: &str = "author-resolver.toml";

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub blocking: BlockingConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ResolverConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit("blocking.prefilter_threshold", self.blocking.prefilter_threshold)?;
        check_unit("scoring.accept_threshold", self.scoring.accept_threshold)?;
        check_unit("scoring.low_evidence_floor", self.scoring.low_evidence_floor)?;
        check_unit("scoring.low_evidence_penalty", self.scoring.low_evidence_penalty)?;
        check_unit(
            "scoring.empty_evidence_confidence",
            self.scoring.empty_evidence_confidence,
        )?;

        if self.blocking.max_block_size < 2 {
            return Err(ConfigError::Invalid(
                "blocking.max_block_size must be at least 2".to_string(),
            ));
        }

        for kind in SignalKind::ALL {
            let weight = self.scoring.weights.get(kind);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "scoring.weights.{} must be a non-negative number, got {}",
                    kind, weight
                )));
            }
        }
        if self.scoring.weights.total() <= 0.0 {
            return Err(ConfigError::Invalid(
                "scoring.weights must not all be zero".to_string(),
            ));
        }

        if self.merge.identifier_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "merge.identifier_retry_attempts must be at least 1".to_string(),
            ));
        }
        for (field, limit) in [
            ("runtime.max_concurrent_blocks", self.runtime.max_concurrent_blocks),
            ("runtime.max_concurrent_writes", self.runtime.max_concurrent_writes),
        ] {
            if limit == 0 || limit > MAX_CONCURRENCY {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 1 and {}, got {}",
                    field, MAX_CONCURRENCY, limit
                )));
            }
        }

        Ok(())
    }
}

fn check_unit(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

/// How the unresolved universe is partitioned into comparison blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPolicy {
    /// normalized family name + first initial of the given name
    #[default]
    ExactKey,
    /// coarse family-initial groups, pairs kept only above a trigram name pre-filter
    NameSimilarity,
}

/// Blocking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingConfig {
    #[serde(default)]
    pub policy: BlockingPolicy,

    /// Minimum cheap name similarity for the name-similarity policy
    #[serde(default = "default_prefilter_threshold")]
    pub prefilter_threshold: f64,

    /// Blocks larger than this are skipped and reported
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            policy: BlockingPolicy::default(),
            prefilter_threshold: default_prefilter_threshold(),
            max_block_size: default_max_block_size(),
        }
    }
}

fn default_prefilter_threshold() -> f64 {
    0.4
}

fn default_max_block_size() -> usize {
    1000
}

/// Base weight per similarity signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    #[serde(default = "default_identifier_weight")]
    pub identifier: f64,
    #[serde(default = "default_publications_weight")]
    pub publications: f64,
    #[serde(default = "default_name_weight")]
    pub name: f64,
    #[serde(default = "default_co_authors_weight")]
    pub co_authors: f64,
    #[serde(default = "default_minor_weight")]
    pub affiliation: f64,
    #[serde(default = "default_minor_weight")]
    pub keywords: f64,
}

impl SignalWeights {
    pub fn get(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::Identifier => self.identifier,
            SignalKind::Publications => self.publications,
            SignalKind::Name => self.name,
            SignalKind::CoAuthors => self.co_authors,
            SignalKind::Affiliation => self.affiliation,
            SignalKind::Keywords => self.keywords,
        }
    }

    pub fn total(&self) -> f64 {
        SignalKind::ALL.iter().map(|k| self.get(*k)).sum()
    }
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            identifier: default_identifier_weight(),
            publications: default_publications_weight(),
            name: default_name_weight(),
            co_authors: default_co_authors_weight(),
            affiliation: default_minor_weight(),
            keywords: default_minor_weight(),
        }
    }
}

fn default_identifier_weight() -> f64 {
    0.40
}

fn default_publications_weight() -> f64 {
    0.25
}

fn default_name_weight() -> f64 {
    0.15
}

fn default_co_authors_weight() -> f64 {
    0.10
}

fn default_minor_weight() -> f64 {
    0.05
}

/// Pairwise scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Composite score (0..=1) at or above which a pair matches
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,

    #[serde(default)]
    pub weights: SignalWeights,

    /// Raw similarity below this counts as low evidence
    #[serde(default = "default_low_evidence_floor")]
    pub low_evidence_floor: f64,

    /// Confidence multiplier applied to low-evidence signals
    #[serde(default = "default_low_evidence_penalty")]
    pub low_evidence_penalty: f64,

    /// Confidence given to a set signal when neither side has data
    #[serde(default = "default_empty_evidence_confidence")]
    pub empty_evidence_confidence: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            accept_threshold: default_accept_threshold(),
            weights: SignalWeights::default(),
            low_evidence_floor: default_low_evidence_floor(),
            low_evidence_penalty: default_low_evidence_penalty(),
            empty_evidence_confidence: default_empty_evidence_confidence(),
        }
    }
}

fn default_accept_threshold() -> f64 {
    0.7
}

fn default_low_evidence_floor() -> f64 {
    0.1
}

fn default_low_evidence_penalty() -> f64 {
    0.1
}

fn default_empty_evidence_confidence() -> f64 {
    0.01
}

/// What to do with a cluster whose members carry different external identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierConflictPolicy {
    /// Report the conflict and link under the first identifier in stable order
    #[default]
    KeepFirst,
    /// Report the conflict and leave the cluster unresolved
    HoldForReview,
}

/// Merge writer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Attempts per cluster when an identifier insert races another writer
    #[serde(default = "default_retry_attempts")]
    pub identifier_retry_attempts: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default)]
    pub on_identifier_conflict: IdentifierConflictPolicy,
}

impl MergeConfig {
    /// Backoff settings for identifier-race retries
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.identifier_retry_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            identifier_retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            on_identifier_conflict: IdentifierConflictPolicy::default(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    10
}

fn default_retry_max_delay_ms() -> u64 {
    200
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_concurrent_blocks")]
    pub max_concurrent_blocks: usize,

    #[serde(default = "default_max_concurrent_writes")]
    pub max_concurrent_writes: usize,

    /// Keep every scored candidate pair in the run report
    #[serde(default)]
    pub record_audit: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_blocks: default_max_concurrent_blocks(),
            max_concurrent_writes: default_max_concurrent_writes(),
            record_audit: false,
        }
    }
}

fn default_max_concurrent_blocks() -> usize {
    8
}

fn default_max_concurrent_writes() -> usize {
    4
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `"json"` for structured output, plain text otherwise
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from a TOML file, layered under environment overrides
pub fn load_config(path: &Path) -> Result<ResolverConfig, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: ResolverConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Write a configuration as a TOML file
pub fn save_config(config: &ResolverConfig, path: &Path) -> Result<(), ConfigError> {
    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::Serialize(e.to_string()))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Look for a config file in the working directory, then the user config dir
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("author-resolver").join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.blocking.policy, BlockingPolicy::ExactKey);
        assert_eq!(config.scoring.accept_threshold, 0.7);
        assert!((config.scoring.weights.total() - 1.0).abs() < 1e-9);
        assert_eq!(config.merge.identifier_retry_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("resolver.toml");
        std::fs::write(
            &path,
            r#"
[blocking]
policy = "name_similarity"
prefilter_threshold = 0.5
max_block_size = 50

[scoring]
accept_threshold = 0.8

[scoring.weights]
identifier = 0.5

[merge]
identifier_retry_attempts = 5
on_identifier_conflict = "hold_for_review"

[runtime]
record_audit = true
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.blocking.policy, BlockingPolicy::NameSimilarity);
        assert_eq!(config.blocking.max_block_size, 50);
        assert_eq!(config.scoring.accept_threshold, 0.8);
        assert_eq!(config.scoring.weights.identifier, 0.5);
        assert_eq!(config.scoring.weights.publications, 0.25);
        assert_eq!(
            config.merge.on_identifier_conflict,
            IdentifierConflictPolicy::HoldForReview
        );
        assert!(config.runtime.record_audit);
        assert_eq!(config.runtime.max_concurrent_blocks, 8);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = ResolverConfig::default();
        config.scoring.accept_threshold = 0.65;
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.scoring.accept_threshold, 0.65);
        assert_eq!(loaded.blocking, config.blocking);
    }

    #[test]
    fn test_load_rejects_invalid_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[scoring]\naccept_threshold = 1.5\n").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config(Path::new("/nonexistent/resolver.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_weights() {
        let mut config = ResolverConfig::default();
        config.scoring.weights = SignalWeights {
            identifier: 0.0,
            publications: 0.0,
            name: 0.0,
            co_authors: 0.0,
            affiliation: 0.0,
            keywords: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_retries_and_tiny_blocks() {
        let mut config = ResolverConfig::default();
        config.merge.identifier_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ResolverConfig::default();
        config.blocking.max_block_size = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_concurrency() {
        let mut config = ResolverConfig::default();
        config.runtime.max_concurrent_writes = 0;
        assert!(config.validate().is_err());

        let mut config = ResolverConfig::default();
        config.runtime.max_concurrent_blocks = usize::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg))
            if msg.contains("runtime.max_concurrent_blocks")));

        let mut config = ResolverConfig::default();
        config.runtime.max_concurrent_writes = MAX_CONCURRENCY;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_from_merge() {
        let retry = MergeConfig::default().retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(10));
    }
}
