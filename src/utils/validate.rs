//! Input validation for document URLs and storage filenames.
//!
//! Filenames that reach the storage layer are derived from caller input and from
//! retrieval requests, so they are checked for path traversal before touching disk.

use thiserror::Error;
use url::Url;

/// Validation error types
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
}

/// Maximum length of one slug component of a filename
const MAX_SLUG_LENGTH: usize = 100;

/// Validate a document URL before downloading it.
///
/// Only `http` and `https` URLs without embedded control characters are accepted.
pub fn validate_url(url: &str) -> Result<Url, ValidationError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::InvalidUrl("empty URL".to_string()));
    }

    if url.chars().any(|ch| ch.is_control()) {
        return Err(ValidationError::InvalidUrl(
            "contains control characters".to_string(),
        ));
    }

    let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ValidationError::InvalidUrl(format!(
            "invalid scheme: {}",
            scheme
        ))),
    }
}

/// Turn free text into a filename-safe component.
///
/// Keeps ASCII alphanumerics and `-`; every other run of characters becomes a single
/// `_`. The result is deterministic for a given input and never starts with a dot.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch);
        } else {
            pending_sep = true;
        }
    }

    let slug: String = slug.chars().take(MAX_SLUG_LENGTH).collect();

    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}

/// Check that a requested filename is a single, visible path component
pub fn validate_filename(filename: &str) -> Result<&str, ValidationError> {
    if filename.is_empty() {
        return Err(ValidationError::InvalidFilename("empty".to_string()));
    }

    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ValidationError::PathTraversal(filename.to_string()));
    }

    if filename.starts_with('.') {
        return Err(ValidationError::InvalidFilename(filename.to_string()));
    }

    if filename.chars().any(|ch| ch.is_control()) {
        return Err(ValidationError::InvalidFilename(
            "contains control characters".to_string(),
        ));
    }

    Ok(filename)
}
