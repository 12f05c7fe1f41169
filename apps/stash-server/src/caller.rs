//! Caller identity forwarded by the authenticating gateway.
//!
//! The gateway resolves the session and passes the result as headers; this
//! server trusts them as-is.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::{header::USER_AGENT, request::Parts};
use stash_storage::UserId;
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-stash-user-id";
pub const USER_EMAIL_HEADER: &str = "x-stash-user-email";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl Caller {
    /// Identity used as the analytics distinct id.
    pub fn actor_id(&self) -> String {
        match &self.email {
            Some(email) => email.clone(),
            None => self.user_id.to_string(),
        }
    }
}

/// `Ok(None)` when no identity was forwarded; `Err` when it was forwarded but is unusable.
pub fn caller_from_parts(parts: &Parts) -> Result<Option<Caller>, ApiError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let user_id = raw
        .to_str()
        .ok()
        .and_then(|s| Uuid::try_parse(s.trim()).ok())
        .ok_or_else(|| ApiError::bad_request(format!("{USER_ID_HEADER} must be a UUID")))?;

    let email = match parts.headers.get(USER_EMAIL_HEADER) {
        Some(value) => {
            let email = value.to_str().map_err(|_| {
                ApiError::bad_request(format!("{USER_EMAIL_HEADER} is not valid text"))
            })?;
            Some(email.trim().to_string()).filter(|e| !e.is_empty())
        }
        None => None,
    };

    Ok(Some(Caller {
        user_id: UserId(user_id),
        email,
    }))
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_parts(parts)?
            .ok_or_else(|| ApiError::unauthenticated(format!("missing {USER_ID_HEADER} header")))
    }
}

impl<S> OptionalFromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        caller_from_parts(parts)
    }
}

/// Request metadata that only feeds analytics.
#[derive(Clone, Debug, Default)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self { user_agent })
    }
}
