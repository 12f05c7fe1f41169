//! Loads the record addressed by `/secret/{id}` before the handler runs.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use stash_storage::{SecretId, SecretRecord};
use uuid::Uuid;

use crate::caller::Caller;
use crate::error::ApiError;
use crate::server::StashServer;

/// A record the caller is allowed to see, plus who the caller is.
#[derive(Debug)]
pub struct ResolvedSecret {
    pub record: SecretRecord,
    pub caller: Caller,
}

impl FromRequestParts<StashServer> for ResolvedSecret {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        server: &StashServer,
    ) -> Result<Self, Self::Rejection> {
        let caller =
            <Caller as FromRequestParts<StashServer>>::from_request_parts(parts, server).await?;
        let Path(id) =
            <Path<Uuid> as FromRequestParts<StashServer>>::from_request_parts(parts, server)
                .await?;

        let record = server.store.get_secret(&SecretId(id)).await?;
        if !record.visible_to(Some(&caller.user_id)) {
            return Err(ApiError::permission_denied("Secret is not accessible"));
        }
        Ok(Self { record, caller })
    }
}
