//! Chemical identifiers and search modes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn cas_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{2,7}-[0-9]{2}-[0-9]$").expect("valid CAS regex"))
}

/// Pattern for locating CAS-shaped tokens inside free text (e.g. a search results page)
pub(crate) fn cas_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[0-9]{2,7}-[0-9]{2}-[0-9]\b").expect("valid CAS token regex"))
}

/// Errors raised while constructing an [`Identifier`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid CAS number: '{0}' (expected digits in the form NNNNNNN-NN-N)")]
    InvalidCas(String),

    #[error("Product name cannot be empty")]
    EmptyName,
}

/// A Chemical Abstracts Service registry number, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CasNumber(String);

impl CasNumber {
    /// Parse a CAS number. Surrounding whitespace is ignored; the check digit is not verified.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if cas_pattern().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(IdentifierError::InvalidCas(raw.to_string()))
        }
    }

    /// Check whether a string is syntactically a CAS number
    pub fn is_valid(raw: &str) -> bool {
        cas_pattern().is_match(raw.trim())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CasNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CasNumber {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CasNumber> for String {
    fn from(value: CasNumber) -> Self {
        value.0
    }
}

/// Which lookup an identifier needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Cas,
    Name,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Cas => "cas",
            IdentifierKind::Name => "name",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chemical identifier: either a CAS number or a free-text product name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Cas(CasNumber),
    Name(String),
}

impl Identifier {
    /// Create a CAS identifier
    pub fn cas(raw: &str) -> Result<Self, IdentifierError> {
        CasNumber::parse(raw).map(Identifier::Cas)
    }

    /// Create a product-name identifier
    pub fn name(raw: &str) -> Result<Self, IdentifierError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::EmptyName);
        }
        Ok(Identifier::Name(trimmed.to_string()))
    }

    /// CAS-shaped input becomes a CAS identifier, anything else a product name
    pub fn detect(raw: &str) -> Result<Self, IdentifierError> {
        if CasNumber::is_valid(raw) {
            Self::cas(raw)
        } else {
            Self::name(raw)
        }
    }

    /// Parse raw input according to the search mode
    pub fn parse(raw: &str, mode: SearchMode) -> Result<Self, IdentifierError> {
        match mode {
            SearchMode::ByCas => Self::cas(raw),
            SearchMode::ByName => Self::name(raw),
            SearchMode::Mixed => Self::detect(raw),
        }
    }

    pub fn kind(&self) -> IdentifierKind {
        match self {
            Identifier::Cas(_) => IdentifierKind::Cas,
            Identifier::Name(_) => IdentifierKind::Name,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Cas(cas) => cas.as_str(),
            Identifier::Name(name) => name,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search mode of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Every identifier is a CAS number
    ByCas,
    /// Every identifier is a product name
    ByName,
    /// Each identifier is resolved according to its own kind
    Mixed,
}

impl SearchMode {
    /// The lookup kind implied by this mode, if the mode implies a single one
    pub fn fixed_kind(&self) -> Option<IdentifierKind> {
        match self {
            SearchMode::ByCas => Some(IdentifierKind::Cas),
            SearchMode::ByName => Some(IdentifierKind::Name),
            SearchMode::Mixed => None,
        }
    }
}
