//! Utility modules supporting SDS resolution.
//!
//! This module provides utility functions and types used throughout the library:
//!
//! - [`HttpClient`]: shared HTTP client with bounded timeouts
//! - [`fetch_page`] / [`fetch_optional_page`]: fetch an HTML page, keeping the redirect target
//! - [`fetch_json`]: fetch and decode a JSON response
//! - [`RetryConfig`]: configuration for retry logic with exponential backoff
//! - [`with_retry`]: run a provider call with retries of transient failures
//! - [`validate_url`], [`validate_filename`], [`slugify`]: input checks for downloads and storage
//!
//! # Retrying a provider call
//!
//! ```rust,no_run
//! use sds_finder::models::Identifier;
//! use sds_finder::sources::{ScriptedSource, Source};
//! use sds_finder::utils::{with_retry, RetryConfig};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let source = ScriptedSource::new("demo").fail_first(1).hit("https://example.com/a.pdf");
//! let identifier = Identifier::cas("67-64-1").unwrap();
//! let config = RetryConfig::default().max_retries(2);
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
//!
//! let result = with_retry(config, deadline, || source.search(&identifier)).await;
//! assert!(result.found);
//! # }
//! ```

mod http;
mod retry;
mod validate;

pub use http::{
    absolute_url, fetch_json, fetch_optional_page, fetch_page, HttpClient, Page, ACCEPT_HTML,
};
pub use retry::{with_retry, RetryConfig};
pub use validate::{slugify, validate_filename, validate_url, ValidationError};
