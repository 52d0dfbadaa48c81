//! Utility modules supporting the resolution engine.
//!
//! - [`normalize_key`], [`token_set`], [`phrase_set`], [`trigram_similarity`]:
//!   text normalization used by blocking and the similarity signals
//! - [`RetryConfig`]: configuration for retry logic with exponential backoff
//! - [`with_retry`]: run a store operation, retrying identifier races
//!
//! # Retry
//!
//! ```rust
//! use author_resolver::utils::{with_retry, RetryConfig, RetryResult};
//! use author_resolver::store::StorageError;
//!
//! # async fn example() {
//! let result = with_retry(RetryConfig::default().without_delay(), || async {
//!     Ok::<_, StorageError>(42)
//! })
//! .await;
//! assert!(matches!(result, RetryResult::Success(42, 1)));
//! # }
//! ```

mod retry;
mod text;

pub use retry::{with_retry, RetryConfig, RetryResult, TransientError};
pub use text::{
    first_initial, is_initial, normalize_key, normalize_title, normalize_whitespace, phrase_set,
    token_set, trigram_similarity, trigrams,
};
