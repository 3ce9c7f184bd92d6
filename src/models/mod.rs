//! Core data models for SDS resolution.

mod identifier;
mod resolution;

pub(crate) use identifier::cas_token_pattern;
pub use identifier::{CasNumber, Identifier, IdentifierError, IdentifierKind, SearchMode};
pub use resolution::{
    BatchEntry, BatchError, BatchRequest, BatchResponse, ErrorKind, FileHandle, ProviderResult,
    ResolutionRecord, ResultRow, SdsHit,
};
