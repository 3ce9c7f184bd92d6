//! Provider results, per-identifier records and batch request/response models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::identifier::{Identifier, IdentifierError, IdentifierKind, SearchMode};

/// Flattened failure taxonomy reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed CAS syntax or empty product name
    InvalidIdentifier,
    /// The provider cannot serve this lookup kind
    UnsupportedMode,
    /// Non-2xx or malformed upstream response
    UpstreamError,
    Timeout,
    /// The query succeeded but had no match
    NotFound,
    DownloadTooLarge,
    DownloadFailed,
    /// Retrieval of an unknown or swept file
    StorageNotFound,
}

impl ErrorKind {
    /// Failures worth another attempt against the same provider
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::UpstreamError | ErrorKind::Timeout)
    }
}

/// A document link found by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdsHit {
    /// Direct URL of the SDS document
    pub url: String,

    /// Supplier that published the sheet, when the provider names one
    pub manufacturer: Option<String>,
}

impl SdsHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            manufacturer: None,
        }
    }

    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        let manufacturer = manufacturer.into();
        let trimmed = manufacturer.trim();
        if !trimmed.is_empty() {
            self.manufacturer = Some(trimmed.to_string());
        }
        self
    }
}

/// Normalized output of one provider invocation.
///
/// `found` and `error_kind` are never both set; use the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    pub found: bool,
    pub document_url: Option<String>,
    pub manufacturer: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ProviderResult {
    pub fn hit(provider: impl Into<String>, hit: SdsHit) -> Self {
        Self {
            provider: provider.into(),
            found: true,
            document_url: Some(hit.url),
            manufacturer: hit.manufacturer,
            error_kind: None,
        }
    }

    pub fn miss(provider: impl Into<String>) -> Self {
        Self::failure(provider, ErrorKind::NotFound)
    }

    pub fn failure(provider: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            provider: provider.into(),
            found: false,
            document_url: None,
            manufacturer: None,
            error_kind: Some(kind),
        }
    }
}

/// Handle to a materialized document inside a request's storage namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub request_id: Uuid,
    pub filename: String,
    pub path: PathBuf,
}

impl FileHandle {
    /// Relative retrieval route for this file
    pub fn download_url(&self) -> String {
        format!("/download/{}/{}", self.request_id, self.filename)
    }
}

/// Final state of one identifier after resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Identifier as supplied by the caller
    pub identifier: String,
    pub kind: Option<IdentifierKind>,
    pub found: bool,
    pub source: Option<String>,
    pub url: Option<String>,
    pub manufacturer: Option<String>,
    pub download: Option<FileHandle>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl ResolutionRecord {
    /// Record for an identifier that was resolved by a provider
    pub fn found(identifier: &Identifier, result: ProviderResult) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: Some(identifier.kind()),
            found: true,
            source: Some(result.provider),
            url: result.document_url,
            manufacturer: result.manufacturer,
            download: None,
            error_kind: None,
            error: None,
        }
    }

    /// Record for an identifier no provider could resolve
    pub fn not_found(identifier: &Identifier, kind: ErrorKind) -> Self {
        Self {
            identifier: identifier.to_string(),
            kind: Some(identifier.kind()),
            found: false,
            source: None,
            url: None,
            manufacturer: None,
            download: None,
            error_kind: Some(kind),
            error: None,
        }
    }

    /// Record for input that never reached a provider
    pub fn invalid(raw: &str, error: &IdentifierError) -> Self {
        Self {
            identifier: raw.to_string(),
            kind: None,
            found: false,
            source: None,
            url: None,
            manufacturer: None,
            download: None,
            error_kind: Some(ErrorKind::InvalidIdentifier),
            error: Some(error.to_string()),
        }
    }

    /// Record for raw input that was still unresolved at the batch deadline
    pub fn timed_out(entry: &BatchEntry) -> Self {
        Self {
            identifier: entry.raw.clone(),
            kind: entry.parsed.as_ref().ok().map(Identifier::kind),
            found: false,
            source: None,
            url: None,
            manufacturer: None,
            download: None,
            error_kind: Some(ErrorKind::Timeout),
            error: Some("batch deadline exceeded".to_string()),
        }
    }
}

/// One caller-supplied identifier and its parse outcome
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    pub raw: String,
    pub parsed: Result<Identifier, IdentifierError>,
}

/// A batch of identifiers resolved together under one request id
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub request_id: Uuid,
    pub entries: Vec<BatchEntry>,
    pub mode: SearchMode,
    pub download: bool,
}

/// Batch-level input errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("At least one identifier is required")]
    EmptyBatch,
}

impl BatchRequest {
    /// Build a batch, parsing every identifier for the given mode.
    ///
    /// Individual invalid identifiers are kept and reported per identifier;
    /// only an empty list is rejected.
    pub fn new<I, S>(identifiers: I, mode: SearchMode, download: bool) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<BatchEntry> = identifiers
            .into_iter()
            .map(|raw| {
                let raw = raw.into();
                let parsed = Identifier::parse(&raw, mode);
                BatchEntry { raw, parsed }
            })
            .collect();

        if entries.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        Ok(Self {
            request_id: Uuid::new_v4(),
            entries,
            mode,
            download,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One row of the batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub identifier: String,
    pub found: bool,
    pub source: Option<String>,
    pub url: Option<String>,
    pub download_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ResolutionRecord> for ResultRow {
    fn from(record: ResolutionRecord) -> Self {
        Self {
            identifier: record.identifier,
            found: record.found,
            source: record.source,
            url: record.url,
            download_url: record.download.as_ref().map(FileHandle::download_url),
            manufacturer: record.manufacturer,
            error_kind: record.error_kind,
            error: record.error,
        }
    }
}

/// Aggregated output of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub request_id: Uuid,
    pub results: Vec<ResultRow>,
    pub total_searched: usize,
    pub found_count: usize,
}
