//! Inbound payload shapes and the allow-list that turns them into store inputs.
//!
//! Deserialization keeps only the recognised attributes; anything else the
//! client sends (`id`, `version`, `ownerUserId`, ...) is dropped silently.

use serde::Deserialize;
use stash_storage::{
    EncryptedField, NewSecret, Scope, SecretId, SecretPatch, SecretType, SecretUpdate,
};
use uuid::Uuid;

use crate::caller::Caller;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldInput {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub hash: String,
}

impl From<FieldInput> for EncryptedField {
    fn from(f: FieldInput) -> Self {
        EncryptedField {
            ciphertext: f.ciphertext,
            iv: f.iv,
            auth_tag: f.auth_tag,
            hash: f.hash,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretInput {
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
    pub key: Option<FieldInput>,
    pub value: Option<FieldInput>,
    pub comment: Option<FieldInput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecretModification {
    pub id: Option<Uuid>,
    pub key: Option<FieldInput>,
    pub value: Option<FieldInput>,
    pub comment: Option<FieldInput>,
    pub expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    pub secret: SecretInput,
}

#[derive(Debug, Deserialize)]
pub struct CreateSecretsRequest {
    pub secrets: Vec<SecretInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSecretRequest {
    pub secret: SecretModification,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSecretsRequest {
    pub secrets: Vec<SecretModification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSecretsRequest {
    pub secret_ids: Vec<Uuid>,
}

/// Build a create input. Scope comes from the path and the owner from the
/// caller, never from the payload.
pub fn for_create(
    input: SecretInput,
    scope: &Scope,
    caller: &Caller,
) -> Result<NewSecret, ApiError> {
    let secret_type: SecretType = input
        .secret_type
        .as_deref()
        .ok_or_else(|| ApiError::validation("type is required"))?
        .parse()
        .map_err(ApiError::validation)?;

    let owner_user_id = match secret_type {
        SecretType::Personal => Some(caller.user_id),
        SecretType::Shared => None,
    };

    Ok(NewSecret {
        scope: scope.clone(),
        secret_type,
        owner_user_id,
        key: input.key.unwrap_or_default().into(),
        value: input.value.unwrap_or_default().into(),
        comment: input.comment.map(Into::into),
    })
}

/// Build an update item. The target id is mandatory; `expectedVersion` is a
/// precondition and never written.
pub fn for_update(input: SecretModification, scope: &Scope) -> Result<SecretUpdate, ApiError> {
    let id = input
        .id
        .ok_or_else(|| ApiError::bad_request("secret id is required"))?;

    Ok(SecretUpdate {
        id: SecretId(id),
        scope: scope.clone(),
        patch: SecretPatch {
            key: input.key.map(Into::into),
            value: input.value.map(Into::into),
            comment: input.comment.map(Into::into),
        },
        expected_version: input.expected_version,
    })
}
