//! Scope authorization for mutations addressed by id.

use stash_storage::{Scope, SecretId};
use std::collections::HashSet;

use crate::error::ApiError;
use crate::server::StashServer;

impl StashServer {
    /// Every id that currently exists in `scope`.
    pub async fn authorized_ids(&self, scope: &Scope) -> Result<HashSet<SecretId>, ApiError> {
        let ids = self.store.list_secret_ids(scope).await.map_err(|e| {
            tracing::error!(
                workspace_id = %scope.workspace_id,
                environment = %scope.environment,
                error = %e,
                "failed to load authorized ids"
            );
            ApiError::internal("Internal server error")
        })?;
        Ok(ids.into_iter().collect())
    }

    /// Fail the whole request if any requested id lies outside `scope`.
    ///
    /// Runs before any write, so a rejected request changes nothing.
    pub async fn ensure_authorized(
        &self,
        scope: &Scope,
        requested: &[SecretId],
    ) -> Result<(), ApiError> {
        let allowed = self.authorized_ids(scope).await?;
        if let Some(denied) = requested.iter().find(|id| !allowed.contains(id)) {
            tracing::debug!(id = %denied, "secret outside authorized scope");
            return Err(ApiError::permission_denied(
                "One or more secrets are not accessible in this workspace environment",
            ));
        }
        Ok(())
    }
}
