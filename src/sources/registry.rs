//! Registry for managing SDS provider plugins and their priority order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    ChemBlinkSource, ChemicalSafetySource, FisherSource, FluorochemSource, Source, TciSource,
    VwrSource,
};
use crate::config::SourcesConfig;
use crate::models::IdentifierKind;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Lookup kinds that a source can serve
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const BY_CAS = 1 << 0;
        const BY_NAME = 1 << 1;
    }
}

impl SourceCapabilities {
    /// Capability required for a lookup kind
    pub fn for_kind(kind: IdentifierKind) -> Self {
        match kind {
            IdentifierKind::Cas => SourceCapabilities::BY_CAS,
            IdentifierKind::Name => SourceCapabilities::BY_NAME,
        }
    }
}

/// Registry construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown source '{0}' in provider order")]
    UnknownSource(String),

    #[error("Source '{0}' appears more than once in the {1} provider order")]
    DuplicateSource(String, IdentifierKind),
}

/// Registry for all available SDS sources.
///
/// Besides the sources themselves, the registry holds the fixed provider order for
/// each lookup kind. That order is the single source of truth for fallback priority.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn Source>>,
    by_cas: Vec<String>,
    by_name: Vec<String>,
    disabled: HashSet<String>,
}

/// Construct every built-in source around a shared HTTP client
pub fn builtin_sources(client: &HttpClient) -> Vec<Arc<dyn Source>> {
    vec![
        Arc::new(ChemBlinkSource::new(client.clone())),
        Arc::new(VwrSource::new(client.clone())),
        Arc::new(FisherSource::new(client.clone())),
        Arc::new(TciSource::new(client.clone())),
        Arc::new(ChemicalSafetySource::new(client.clone())),
        Arc::new(FluorochemSource::new(client.clone())),
    ]
}

impl SourceRegistry {
    /// Create the registry of built-in sources using the configured order
    pub fn from_config(config: &SourcesConfig, client: &HttpClient) -> Result<Self, RegistryError> {
        let mut registry =
            Self::from_sources(builtin_sources(client), &config.by_cas, &config.by_name)?;

        for id in &config.disabled {
            if !registry.has(id) {
                return Err(RegistryError::UnknownSource(id.clone()));
            }
            registry.disable(id);
        }

        Ok(registry)
    }

    /// Create a registry from arbitrary sources and explicit provider orders
    pub fn from_sources<C, N>(
        sources: Vec<Arc<dyn Source>>,
        by_cas: &[C],
        by_name: &[N],
    ) -> Result<Self, RegistryError>
    where
        C: AsRef<str>,
        N: AsRef<str>,
    {
        let mut registry = Self {
            sources: HashMap::new(),
            by_cas: Vec::new(),
            by_name: Vec::new(),
            disabled: HashSet::new(),
        };

        for source in sources {
            registry.register(source);
        }

        registry.by_cas = registry.validate_order(by_cas, IdentifierKind::Cas)?;
        registry.by_name = registry.validate_order(by_name, IdentifierKind::Name)?;

        Ok(registry)
    }

    /// Create a registry that consults the given sources in list order for both kinds
    pub fn ordered(sources: Vec<Arc<dyn Source>>) -> Self {
        let order: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();
        let mut registry = Self {
            sources: HashMap::new(),
            by_cas: Vec::new(),
            by_name: Vec::new(),
            disabled: HashSet::new(),
        };
        for source in sources {
            registry.register(source);
        }
        let mut seen = HashSet::new();
        let order: Vec<String> = order.into_iter().filter(|id| seen.insert(id.clone())).collect();
        registry.by_cas = order.clone();
        registry.by_name = order;
        registry
    }

    fn validate_order<S: AsRef<str>>(
        &self,
        order: &[S],
        kind: IdentifierKind,
    ) -> Result<Vec<String>, RegistryError> {
        let mut seen = HashSet::new();
        let mut validated = Vec::with_capacity(order.len());

        for id in order {
            let id = id.as_ref().trim();
            if !self.has(id) {
                return Err(RegistryError::UnknownSource(id.to_string()));
            }
            if !seen.insert(id) {
                return Err(RegistryError::DuplicateSource(id.to_string(), kind));
            }
            validated.push(id.to_string());
        }

        Ok(validated)
    }

    /// Register a new source (not consulted until it appears in a provider order)
    pub fn register(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Exclude a source from every provider order
    pub fn disable(&mut self, id: &str) {
        self.disabled.insert(id.to_string());
    }

    /// Ordered sources to consult for a lookup kind.
    ///
    /// Disabled sources and sources lacking the capability are skipped.
    pub fn providers_for(&self, kind: IdentifierKind) -> Vec<Arc<dyn Source>> {
        self.order(kind)
            .iter()
            .filter(|id| !self.disabled.contains(id.as_str()))
            .filter_map(|id| self.sources.get(id))
            .filter(|source| source.supports(kind))
            .cloned()
            .collect()
    }

    /// Configured provider order for a lookup kind
    pub fn order(&self, kind: IdentifierKind) -> &[String] {
        match kind {
            IdentifierKind::Cas => &self.by_cas,
            IdentifierKind::Name => &self.by_name,
        }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Check if a source is disabled
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Get all source IDs
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(|s| s.as_str())
    }

    /// Get the number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcesConfig;
    use crate::sources::ScriptedSource;

    fn ids(sources: &[Arc<dyn Source>]) -> Vec<&str> {
        sources.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_builtin_registry() {
        let client = HttpClient::new().unwrap();
        let registry = SourceRegistry::from_config(&SourcesConfig::default(), &client).unwrap();

        assert_eq!(registry.len(), 6);
        for id in ["chemblink", "vwr", "fisher", "tci", "chemical_safety", "fluorochem"] {
            assert!(registry.has(id), "Source '{}' should be registered", id);
        }
    }

    #[test]
    fn test_default_priority_order() {
        let client = HttpClient::new().unwrap();
        let registry = SourceRegistry::from_config(&SourcesConfig::default(), &client).unwrap();

        assert_eq!(
            ids(&registry.providers_for(IdentifierKind::Cas)),
            ["chemblink", "vwr", "fisher", "tci", "chemical_safety", "fluorochem"]
        );
        assert_eq!(
            ids(&registry.providers_for(IdentifierKind::Name)),
            ["chemical_safety", "vwr", "fisher", "tci", "chemblink", "fluorochem"]
        );
    }

    #[test]
    fn test_disabled_sources_are_skipped() {
        let client = HttpClient::new().unwrap();
        let config = SourcesConfig {
            disabled: vec!["vwr".to_string(), "tci".to_string()],
            ..SourcesConfig::default()
        };
        let registry = SourceRegistry::from_config(&config, &client).unwrap();

        assert_eq!(
            ids(&registry.providers_for(IdentifierKind::Cas)),
            ["chemblink", "fisher", "chemical_safety", "fluorochem"]
        );
        assert!(registry.is_disabled("vwr"));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let client = HttpClient::new().unwrap();
        let config = SourcesConfig {
            by_cas: vec!["chemblink".to_string(), "sigma".to_string()],
            ..SourcesConfig::default()
        };
        assert_eq!(
            SourceRegistry::from_config(&config, &client).unwrap_err(),
            RegistryError::UnknownSource("sigma".to_string())
        );
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let sources: Vec<Arc<dyn Source>> = vec![Arc::new(ScriptedSource::new("a"))];
        let err = SourceRegistry::from_sources(sources, &["a", "a"], &["a"]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateSource("a".to_string(), IdentifierKind::Cas)
        );
    }

    #[test]
    fn test_capability_filter() {
        let sources: Vec<Arc<dyn Source>> = vec![
            Arc::new(ScriptedSource::new("cas-only").with_capabilities(SourceCapabilities::BY_CAS)),
            Arc::new(ScriptedSource::new("both")),
        ];
        let registry = SourceRegistry::ordered(sources);

        assert_eq!(ids(&registry.providers_for(IdentifierKind::Cas)), ["cas-only", "both"]);
        assert_eq!(ids(&registry.providers_for(IdentifierKind::Name)), ["both"]);
    }

    #[test]
    fn test_capabilities() {
        let caps = SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME;
        assert!(caps.contains(SourceCapabilities::for_kind(IdentifierKind::Cas)));
        assert!(caps.contains(SourceCapabilities::for_kind(IdentifierKind::Name)));
        assert!(!SourceCapabilities::BY_CAS.contains(SourceCapabilities::BY_NAME));
    }
}
