//! Batch response assembly.

use uuid::Uuid;

use crate::models::{BatchResponse, ResolutionRecord, ResultRow};

/// Combine per-identifier records, already in input order, into the batch response
pub fn aggregate(request_id: Uuid, records: Vec<ResolutionRecord>) -> BatchResponse {
    let total_searched = records.len();
    let found_count = records.iter().filter(|record| record.found).count();

    BatchResponse {
        request_id,
        results: records.into_iter().map(ResultRow::from).collect(),
        total_searched,
        found_count,
    }
}
