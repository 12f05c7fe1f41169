//! Storage abstraction for stash.
//!
//! Backend crates (e.g., stash-store-sqlite) implement this trait so the server
//! doesn't depend on any specific database engine or schema details.

mod types;

pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// The storage trait the server depends on.
///
/// Reads and mutations are **scoped by workspace and environment**; only
/// `get_secret` addresses a record by id alone, for the resolver stage that
/// runs ahead of single-record routes.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ────────────────────────────────────── Create ───────────────────────────────────────

    /// Insert one secret. Assigns `id`, `version = 1` and timestamps.
    async fn create_secret(&self, secret: &NewSecret) -> Result<SecretRecord, StoreError>;

    /// Insert many secrets. Every item is validated before anything is written,
    /// and either all of them are inserted or none are.
    async fn create_secrets(&self, secrets: &[NewSecret])
        -> Result<Vec<SecretRecord>, StoreError>;

    // ─────────────────────────────────────── Read ────────────────────────────────────────

    /// Fetch a secret by ID.
    async fn get_secret(&self, id: &SecretId) -> Result<SecretRecord, StoreError>;

    /// List the secrets in a scope visible to the querying caller
    /// (shared ones, plus personal ones they own).
    async fn list_secrets(&self, query: &SecretQuery) -> Result<Vec<SecretRecord>, StoreError>;

    /// IDs of every secret that currently exists in a scope, regardless of owner.
    async fn list_secret_ids(&self, scope: &Scope) -> Result<Vec<SecretId>, StoreError>;

    // ───────────────────────────────────── Mutations ─────────────────────────────────────

    /// Apply field overwrites and bump `version` by one per item.
    ///
    /// Fails up front with `Validation` if any patch is invalid. After that,
    /// per-item problems (record gone, version mismatch) land in
    /// [`BatchResult::failed`] without undoing items already applied.
    async fn update_secrets(&self, updates: &[SecretUpdate]) -> Result<BatchResult, StoreError>;

    /// Delete secrets by ID, restricted to `scope`.
    async fn delete_secrets(
        &self,
        scope: &Scope,
        ids: &[SecretId],
    ) -> Result<BatchResult, StoreError>;
}
