use thiserror::Error;

/// Errors raised by record decoding, filtering and the write boundary.
///
/// Aggregation itself never fails on individual values (bad coordinates are
/// normalised away), so anything that reaches a caller here means the input
/// could not be used at all.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("document '{document_id}' is not a tabular case record: {reason}")]
    DataIntegrity { document_id: String, reason: String },
    #[error("case_id is required")]
    MissingCaseId,
    #[error("filter on '{field}' could not be evaluated: {reason}")]
    Filter { field: String, reason: String },
    #[error("unknown case field '{0}'")]
    UnknownField(String),
    #[error("case '{case_id}' has {matches} documents; pass document_id to choose one")]
    AmbiguousCase { case_id: String, matches: usize },
    #[error("invalid request body: {0}")]
    InvalidPayload(String),
}
