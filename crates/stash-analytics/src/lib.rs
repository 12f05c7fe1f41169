//! Product analytics for stash secret operations.
//!
//! This crate defines the [`Analytics`] sink trait and the [`Emitter`] the
//! server holds. Sinks:
//! - Memory (in-process recording, tests and local runs)
//! - PostHog (HTTP capture API)
//!
//! Emission is best effort. The emitter hands each event to a background task
//! and never reports delivery problems back to the request that produced it.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use stash_storage::{Scope, WorkspaceId};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Which operation family produced the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "secrets added")]
    SecretsAdded,
    #[serde(rename = "secrets modified")]
    SecretsModified,
    #[serde(rename = "secrets deleted")]
    SecretsDeleted,
    #[serde(rename = "secrets pulled")]
    SecretsPulled,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SecretsAdded => "secrets added",
            EventName::SecretsModified => "secrets modified",
            EventName::SecretsDeleted => "secrets deleted",
            EventName::SecretsPulled => "secrets pulled",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client surface the request came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Cli,
}

impl Channel {
    /// Browsers all advertise `Mozilla`; anything else is treated as the CLI.
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent {
            Some(ua) if ua.to_lowercase().contains("mozilla") => Channel::Web,
            _ => Channel::Cli,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Cli => "cli",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProperties {
    pub number_of_secrets: usize,
    pub workspace_id: WorkspaceId,
    pub environment: String,
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// One analytics event, keyed by the acting user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event: EventName,
    pub distinct_id: String,
    pub properties: EventProperties,
}

impl AnalyticsEvent {
    pub fn new(
        event: EventName,
        distinct_id: impl Into<String>,
        count: usize,
        scope: &Scope,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            event,
            distinct_id: distinct_id.into(),
            properties: EventProperties {
                number_of_secrets: count,
                workspace_id: scope.workspace_id,
                environment: scope.environment.0.clone(),
                channel: Channel::from_user_agent(user_agent.as_deref()),
                user_agent,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("capture rejected with status {status}")]
    Rejected { status: u16 },
}

/// Stream of captured events, for sinks that can be observed.
pub type EventStream = Pin<Box<dyn Stream<Item = AnalyticsEvent> + Send>>;

/// A destination for analytics events.
#[async_trait]
pub trait Analytics: Send + Sync {
    /// Deliver one event. Called from a background task, never on the request path.
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Fire-and-forget front for an optional sink.
#[derive(Clone, Default)]
pub struct Emitter {
    sink: Option<Arc<dyn Analytics>>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn Analytics>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Queue `event` for delivery. Does nothing when no sink is configured.
    pub fn emit(&self, event: AnalyticsEvent) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = sink.capture(&event).await {
                tracing::warn!(event = %event.event, error = %e, "analytics delivery failed");
            }
        });
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
