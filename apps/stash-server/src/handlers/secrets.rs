//! Secret handlers: create, list, get, update, delete (single and bulk).

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use stash_analytics::EventName;
use stash_storage::{Scope, SecretId, SecretQuery, SecretRecord, WorkspaceId};
use std::collections::HashSet;
use uuid::Uuid;

use crate::caller::{Caller, ClientInfo};
use crate::error::{ApiError, ApiResult};
use crate::executor::{bulk_create_error, settle};
use crate::resolve::ResolvedSecret;
use crate::sanitize::{
    for_create, for_update, CreateSecretRequest, CreateSecretsRequest, DeleteSecretsRequest,
    UpdateSecretRequest, UpdateSecretsRequest,
};
use crate::server::StashServer;

const ANONYMOUS_ACTOR: &str = "anonymous";

type ScopePath = Result<Path<(Uuid, String)>, PathRejection>;
type Body<T> = Result<Json<T>, JsonRejection>;

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretEnvelope {
    pub secret: SecretRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretsEnvelope {
    pub secrets: Vec<SecretRecord>,
}

#[derive(Debug, Deserialize)]
pub struct EnvironmentQuery {
    pub environment: String,
}

fn scope_from(workspace_id: Uuid, environment: String) -> Result<Scope, ApiError> {
    if environment.trim().is_empty() {
        return Err(ApiError::validation("environment must not be empty"));
    }
    Ok(Scope::new(WorkspaceId(workspace_id), environment))
}

fn scope_from_path(path: ScopePath) -> Result<Scope, ApiError> {
    let Path((workspace_id, environment)) = path?;
    scope_from(workspace_id, environment)
}

fn indexed(index: usize, err: ApiError) -> ApiError {
    ApiError::new(err.status, err.code, format!("secrets[{}]: {}", index, err.message))
}

// ─────────────────────────────────────── Create ────────────────────────────────────────

pub async fn create_secret(
    State(server): State<StashServer>,
    caller: Caller,
    client: ClientInfo,
    path: ScopePath,
    body: Body<CreateSecretRequest>,
) -> ApiResult<SecretEnvelope> {
    let scope = scope_from_path(path)?;
    let Json(req) = body?;

    let new = for_create(req.secret, &scope, &caller)?;
    let record = server.store.create_secret(&new).await?;

    server.record(EventName::SecretsAdded, caller.actor_id(), 1, &scope, client);
    Ok(Json(SecretEnvelope { secret: record }))
}

pub async fn create_secrets(
    State(server): State<StashServer>,
    caller: Caller,
    client: ClientInfo,
    path: ScopePath,
    body: Body<CreateSecretsRequest>,
) -> ApiResult<SecretsEnvelope> {
    let scope = scope_from_path(path)?;
    let Json(req) = body?;

    let new = req
        .secrets
        .into_iter()
        .enumerate()
        .map(|(i, input)| for_create(input, &scope, &caller).map_err(|e| indexed(i, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let records = server
        .store
        .create_secrets(&new)
        .await
        .map_err(bulk_create_error)?;

    if !records.is_empty() {
        server.record(
            EventName::SecretsAdded,
            caller.actor_id(),
            records.len(),
            &scope,
            client,
        );
    }
    Ok(Json(SecretsEnvelope { secrets: records }))
}

// ──────────────────────────────────────── Read ─────────────────────────────────────────

pub async fn get_secrets(
    State(server): State<StashServer>,
    caller: Option<Caller>,
    client: ClientInfo,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<EnvironmentQuery>, QueryRejection>,
) -> ApiResult<Vec<SecretRecord>> {
    let Path(workspace_id) = path?;
    let Query(q) = query?;
    let scope = scope_from(workspace_id, q.environment)?;

    let records = server
        .store
        .list_secrets(&SecretQuery {
            scope: scope.clone(),
            caller: caller.as_ref().map(|c| c.user_id),
        })
        .await?;

    let actor = caller
        .as_ref()
        .map(Caller::actor_id)
        .unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());
    server.record(EventName::SecretsPulled, actor, records.len(), &scope, client);
    Ok(Json(records))
}

pub async fn get_secret(
    State(server): State<StashServer>,
    client: ClientInfo,
    resolved: ResolvedSecret,
) -> ApiResult<SecretEnvelope> {
    let ResolvedSecret { record, caller } = resolved;
    server.record(
        EventName::SecretsPulled,
        caller.actor_id(),
        1,
        &record.scope(),
        client,
    );
    Ok(Json(SecretEnvelope { secret: record }))
}

// ─────────────────────────────────────── Update ────────────────────────────────────────

pub async fn update_secret(
    State(server): State<StashServer>,
    caller: Caller,
    client: ClientInfo,
    path: ScopePath,
    body: Body<UpdateSecretRequest>,
) -> ApiResult<SecretEnvelope> {
    let scope = scope_from_path(path)?;
    let Json(req) = body?;

    let update = for_update(req.secret, &scope)?;
    let id = update.id;
    server.ensure_authorized(&scope, &[id]).await?;

    let current = server.store.get_secret(&id).await?;
    if !current.visible_to(Some(&caller.user_id)) {
        return Err(ApiError::permission_denied("Secret is not accessible"));
    }

    settle(server.store.update_secrets(&[update]).await?)?;
    let record = server.store.get_secret(&id).await?;

    server.record(EventName::SecretsModified, caller.actor_id(), 1, &scope, client);
    Ok(Json(SecretEnvelope { secret: record }))
}

pub async fn update_secrets(
    State(server): State<StashServer>,
    caller: Caller,
    client: ClientInfo,
    path: ScopePath,
    body: Body<UpdateSecretsRequest>,
) -> Result<StatusCode, ApiError> {
    let scope = scope_from_path(path)?;
    let Json(req) = body?;

    let updates = req
        .secrets
        .into_iter()
        .enumerate()
        .map(|(i, input)| for_update(input, &scope).map_err(|e| indexed(i, e)))
        .collect::<Result<Vec<_>, _>>()?;
    if updates.is_empty() {
        return Ok(StatusCode::OK);
    }

    let ids: Vec<SecretId> = updates.iter().map(|u| u.id).collect();
    server.ensure_authorized(&scope, &ids).await?;

    let applied = settle(server.store.update_secrets(&updates).await?)?;

    server.record(
        EventName::SecretsModified,
        caller.actor_id(),
        applied.len(),
        &scope,
        client,
    );
    Ok(StatusCode::OK)
}

// ─────────────────────────────────────── Delete ────────────────────────────────────────

pub async fn delete_secret(
    State(server): State<StashServer>,
    client: ClientInfo,
    resolved: ResolvedSecret,
) -> ApiResult<SecretEnvelope> {
    let ResolvedSecret { record, caller } = resolved;
    let scope = record.scope();

    settle(server.store.delete_secrets(&scope, &[record.id]).await?)?;

    server.record(EventName::SecretsDeleted, caller.actor_id(), 1, &scope, client);
    Ok(Json(SecretEnvelope { secret: record }))
}

pub async fn delete_secrets(
    State(server): State<StashServer>,
    caller: Caller,
    client: ClientInfo,
    path: ScopePath,
    body: Body<DeleteSecretsRequest>,
) -> Result<StatusCode, ApiError> {
    let scope = scope_from_path(path)?;
    let Json(req) = body?;

    let mut seen = HashSet::new();
    let ids: Vec<SecretId> = req
        .secret_ids
        .into_iter()
        .map(SecretId)
        .filter(|id| seen.insert(*id))
        .collect();
    if ids.is_empty() {
        return Ok(StatusCode::OK);
    }

    server.ensure_authorized(&scope, &ids).await?;
    let deleted = settle(server.store.delete_secrets(&scope, &ids).await?)?;

    server.record(
        EventName::SecretsDeleted,
        caller.actor_id(),
        deleted.len(),
        &scope,
        client,
    );
    Ok(StatusCode::OK)
}
