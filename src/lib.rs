//! # SDS Finder
//!
//! Resolve CAS registry numbers and product names to Safety Data Sheets by querying
//! several chemical supplier and aggregator sites in a fixed priority order.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Identifiers, provider results and batch request/response types
//! - [`sources`]: Provider adapters behind the [`Source`] trait, and their [`SourceRegistry`]
//! - [`resolver`]: The [`BatchResolver`] orchestrating providers across a batch
//! - [`storage`]: Request-scoped download storage and its cleanup
//! - [`utils`]: HTTP client, retries and input validation
//! - [`config`]: Configuration management

pub mod config;
pub mod models;
pub mod resolver;
pub mod sources;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use models::{BatchRequest, BatchResponse, ErrorKind, Identifier, SearchMode};
pub use resolver::{BatchResolver, ResolveError};
pub use sources::{Source, SourceRegistry};
pub use storage::Materializer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
