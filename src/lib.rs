//! # Author Resolver
//!
//! Resolves duplicate author records scraped from bibliographic sources
//! (ORCID, DBLP, OpenAlex, ...) into canonical master authors.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Source records, master authors and run artifacts (clusters, reports)
//! - [`resolve`]: The engine: blocking, pairwise scoring, clustering and the merge writer
//! - [`store`]: Persistence boundary with an in-memory backend
//! - [`utils`]: Text normalization and retry helpers
//! - [`config`]: Configuration management
//! - [`ui`]: Terminal output helpers for the CLI

pub mod config;
pub mod models;
pub mod resolve;
pub mod store;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use config::ResolverConfig;
pub use models::{MasterAuthor, RunReport, SourceRecord};
pub use resolve::{ResolveError, Resolver};
pub use store::{AuthorStore, InMemoryStore, StorageError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
