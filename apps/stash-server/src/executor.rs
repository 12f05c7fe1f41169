//! Turning store batch outcomes into HTTP results.

use stash_storage::{BatchResult, SecretId, StoreError};

use crate::error::ApiError;

/// Succeed only when every item was applied.
///
/// On a partial batch the applied items stay applied; every failure is logged
/// and the request reports the first one.
pub fn settle(result: BatchResult) -> Result<Vec<SecretId>, ApiError> {
    if result.is_complete() {
        return Ok(result.succeeded);
    }

    for failure in &result.failed {
        tracing::warn!(id = %failure.id, error = %failure.error, "batch item not applied");
    }
    tracing::warn!(
        applied = result.succeeded.len(),
        failed = result.failed.len(),
        "partial batch"
    );

    match result.failed.into_iter().next() {
        Some(first) => Err(first.error.into()),
        None => Ok(result.succeeded),
    }
}

/// Bulk create reports schema problems as-is and everything else generically.
pub fn bulk_create_error(err: StoreError) -> ApiError {
    match err {
        StoreError::Validation(msg) => ApiError::validation(msg),
        other => {
            tracing::error!(error = %other, "bulk secret creation failed");
            ApiError::internal("Failed to create secrets, please try again")
        }
    }
}
