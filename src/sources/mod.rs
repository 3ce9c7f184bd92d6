//! SDS provider plugins with an extensible trait-based architecture.
//!
//! This module defines the [`Source`] trait that every provider adapter implements.
//! New providers are added by implementing this trait and registering them with the
//! [`SourceRegistry`]; the order in which providers are consulted is configuration,
//! never logic inside the resolver.
//!
//! # Providers
//!
//! | id | Lookup by CAS | Lookup by name |
//! |---|---|---|
//! | `chemblink` | CAS-indexed MSDS pages | site search, then the CAS page of the first hit |
//! | `vwr` | Avantor/VWR catalog search | VWR MSDS keyword search |
//! | `fisher` | Fisher SDS search, row matched by CAS image | Fisher SDS search, first row |
//! | `tci` | CSRF-tokenized product search + SDS document lookup | same flow, no CAS check |
//! | `chemical_safety` | JSON search API, exact CAS | JSON search API, contains + synonyms |
//! | `fluorochem` | site search | molecule discovery API |
//!
//! # Runtime configuration
//!
//! The provider order per lookup kind and the set of disabled providers come from the
//! `[sources]` configuration section, or from the environment:
//!
//! ```bash
//! export SDS_FINDER__SOURCES__DISABLED="vwr,fluorochem"
//! ```

mod chemblink;
mod chemical_safety;
mod fisher;
mod fluorochem;
mod registry;
mod tci;
mod vwr;

pub mod mock;

pub use chemblink::ChemBlinkSource;
pub use chemical_safety::ChemicalSafetySource;
pub use fisher::FisherSource;
pub use fluorochem::FluorochemSource;
pub use mock::{Script, ScriptedSource};
pub use registry::{builtin_sources, RegistryError, SourceCapabilities, SourceRegistry};
pub use tci::TciSource;
pub use vwr::VwrSource;

use crate::models::{CasNumber, ErrorKind, Identifier, IdentifierKind, ProviderResult, SdsHit};
use async_trait::async_trait;

/// The Source trait defines the interface for all SDS provider adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `capabilities`
/// 3. Implement `search_by_cas` and/or `search_by_name` for the lookups it supports
/// 4. Add the source to `SourceRegistry::from_config()` or register it dynamically
///
/// Adapters report expected failures through [`SourceError`] and must not retry;
/// retries belong to the resolver.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (used in configuration, e.g. "chemblink")
    fn id(&self) -> &str;

    /// Human-readable name of this source, reported as the result `source`
    fn name(&self) -> &str;

    /// Lookup kinds this source can serve
    fn capabilities(&self) -> SourceCapabilities;

    /// Whether this source can serve the given lookup kind
    fn supports(&self, kind: IdentifierKind) -> bool {
        self.capabilities().contains(SourceCapabilities::for_kind(kind))
    }

    /// Look up an SDS by CAS number
    async fn search_by_cas(&self, _cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Look up an SDS by product name
    async fn search_by_name(&self, _name: &str) -> Result<Option<SdsHit>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Run the lookup matching the identifier's kind and normalize the outcome.
    ///
    /// Never fails: errors are reported through `ProviderResult::error_kind`.
    async fn search(&self, identifier: &Identifier) -> ProviderResult {
        let outcome = match identifier {
            Identifier::Cas(cas) if self.supports(IdentifierKind::Cas) => {
                self.search_by_cas(cas).await
            }
            Identifier::Name(name) if self.supports(IdentifierKind::Name) => {
                self.search_by_name(name).await
            }
            _ => Err(SourceError::NotImplemented),
        };

        match outcome {
            Ok(Some(hit)) => {
                tracing::debug!("{} found SDS for {}: {}", self.id(), identifier, hit.url);
                ProviderResult::hit(self.name(), hit)
            }
            Ok(None) => {
                tracing::debug!("{} has no SDS for {}", self.id(), identifier);
                ProviderResult::miss(self.name())
            }
            Err(e) => {
                tracing::debug!("{} failed for {}: {}", self.id(), identifier, e);
                ProviderResult::failure(self.name(), e.kind())
            }
        }
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested lookup is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// Parsing error (JSON, HTML, headers)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Non-success response from the source
    #[error("API error: {0}")]
    Api(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl SourceError {
    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::NotImplemented => ErrorKind::UnsupportedMode,
            SourceError::Timeout => ErrorKind::Timeout,
            SourceError::Network(_)
            | SourceError::Parse(_)
            | SourceError::Api(_)
            | SourceError::Other(_) => ErrorKind::UpstreamError,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<url::ParseError> for SourceError {
    fn from(err: url::ParseError) -> Self {
        SourceError::Parse(format!("URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(SourceError::NotImplemented.kind(), ErrorKind::UnsupportedMode);
        assert_eq!(SourceError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            SourceError::Api("503".to_string()).kind(),
            ErrorKind::UpstreamError
        );
        assert_eq!(
            SourceError::Parse("bad".to_string()).kind(),
            ErrorKind::UpstreamError
        );
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_reported() {
        let source = ScriptedSource::new("cas-only").with_capabilities(SourceCapabilities::BY_CAS);
        let identifier = Identifier::name("Acetone").unwrap();

        let result = source.search(&identifier).await;

        assert!(!result.found);
        assert_eq!(result.error_kind, Some(ErrorKind::UnsupportedMode));
        assert_eq!(source.calls(), 0);
    }
}
