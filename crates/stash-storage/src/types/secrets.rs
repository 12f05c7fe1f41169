//! Secret record types.
//!
//! Every encrypted attribute is an opaque string produced by the client. The
//! store never decodes, decrypts or recomputes any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{EnvName, SecretId, UserId, WorkspaceId};
use crate::StoreError;

/// Visibility of a secret inside its scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    /// Owned by a single user and hidden from everyone else.
    Personal,
    /// Visible to any caller with access to the scope.
    Shared,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Personal => "personal",
            SecretType::Shared => "shared",
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(SecretType::Personal),
            "shared" => Ok(SecretType::Shared),
            _ => Err(format!("Unknown secret type: {}", s)),
        }
    }
}

/// One client-encrypted attribute: ciphertext plus the AEAD parameters needed
/// to open it, and a caller supplied lookup hash.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedField {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub hash: String,
}

impl EncryptedField {
    fn check(&self, field: &str, require_hash: bool) -> Result<(), StoreError> {
        let mut missing = Vec::new();
        if self.ciphertext.is_empty() {
            missing.push("ciphertext");
        }
        if self.iv.is_empty() {
            missing.push("iv");
        }
        if self.auth_tag.is_empty() {
            missing.push("authTag");
        }
        if require_hash && self.hash.is_empty() {
            missing.push("hash");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(format!(
                "{} is missing required attributes: {}",
                field,
                missing.join(", ")
            )))
        }
    }
}

/// The `(workspace, environment)` pair bounding what a caller may touch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    pub workspace_id: WorkspaceId,
    pub environment: EnvName,
}

impl Scope {
    pub fn new(workspace_id: WorkspaceId, environment: impl Into<String>) -> Self {
        Self {
            workspace_id,
            environment: EnvName(environment.into()),
        }
    }
}

/// A persisted secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub id: SecretId,
    pub workspace_id: WorkspaceId,
    pub environment: EnvName,
    /// Present only for personal secrets; omitted (not `null`) otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<UserId>,
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    pub version: i64,
    pub key: EncryptedField,
    pub value: EncryptedField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<EncryptedField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    pub fn scope(&self) -> Scope {
        Scope {
            workspace_id: self.workspace_id,
            environment: self.environment.clone(),
        }
    }

    /// Whether `caller` may see this record (shared, or personal and owned by them).
    pub fn visible_to(&self, caller: Option<&UserId>) -> bool {
        match &self.owner_user_id {
            None => true,
            Some(owner) => caller == Some(owner),
        }
    }
}

/// Parameters for creating a secret. Built by the server from a sanitized payload.
#[derive(Clone, Debug)]
pub struct NewSecret {
    pub scope: Scope,
    pub secret_type: SecretType,
    pub owner_user_id: Option<UserId>,
    pub key: EncryptedField,
    pub value: EncryptedField,
    pub comment: Option<EncryptedField>,
}

impl NewSecret {
    /// Schema checks every backend runs before inserting.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.scope.environment.0.trim().is_empty() {
            return Err(StoreError::Validation("environment must not be empty".into()));
        }
        match (self.secret_type, &self.owner_user_id) {
            (SecretType::Personal, None) => {
                return Err(StoreError::Validation(
                    "personal secrets require an owner".into(),
                ))
            }
            (SecretType::Shared, Some(_)) => {
                return Err(StoreError::Validation(
                    "shared secrets cannot have an owner".into(),
                ))
            }
            _ => {}
        }
        self.key.check("key", true)?;
        self.value.check("value", true)?;
        if let Some(comment) = &self.comment {
            comment.check("comment", false)?;
        }
        Ok(())
    }
}

/// Field-level overwrite of the encrypted triples. `None` leaves a triple untouched.
#[derive(Clone, Debug, Default)]
pub struct SecretPatch {
    pub key: Option<EncryptedField>,
    pub value: Option<EncryptedField>,
    pub comment: Option<EncryptedField>,
}

impl SecretPatch {
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(key) = &self.key {
            key.check("key", true)?;
        }
        if let Some(value) = &self.value {
            value.check("value", true)?;
        }
        if let Some(comment) = &self.comment {
            comment.check("comment", false)?;
        }
        Ok(())
    }
}

/// One item of a batched update.
#[derive(Clone, Debug)]
pub struct SecretUpdate {
    pub id: SecretId,
    /// The update only matches a record inside this scope.
    pub scope: Scope,
    pub patch: SecretPatch,
    /// When set, the update applies only if the stored version still equals it.
    pub expected_version: Option<i64>,
}

/// Read filter: everything in `scope` that is shared or owned by `caller`.
#[derive(Clone, Debug)]
pub struct SecretQuery {
    pub scope: Scope,
    pub caller: Option<UserId>,
}

/// Why one batch item was not applied.
#[derive(Debug)]
pub struct BatchFailure {
    pub id: SecretId,
    pub error: StoreError,
}

/// Outcome of a batch: each item is atomic, the batch as a whole is not.
/// Items in `succeeded` stay applied even when others fail.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<SecretId>,
    pub failed: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn ok(&mut self, id: SecretId) {
        self.succeeded.push(id);
    }

    pub fn fail(&mut self, id: SecretId, error: StoreError) {
        self.failed.push(BatchFailure { id, error });
    }

    /// True when every item was applied.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
