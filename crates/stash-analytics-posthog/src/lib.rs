//! PostHog analytics sink.
//!
//! Sends each event to the PostHog capture endpoint (`POST {host}/capture/`).
//! One attempt per event with a bounded request timeout; the caller decides
//! what to do with a failure (the emitter logs and drops it).

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use stash_analytics::{Analytics, AnalyticsError, AnalyticsEvent, EventProperties};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "https://app.posthog.com";

#[derive(Clone, Debug)]
pub struct PostHogConfig {
    pub api_key: String,
    pub host: String,
    pub timeout: Duration,
}

impl PostHogConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct CapturePayload<'a> {
    api_key: &'a str,
    event: &'a str,
    distinct_id: &'a str,
    properties: &'a EventProperties,
    timestamp: String,
}

pub struct PostHogClient {
    http: reqwest::Client,
    capture_url: String,
    api_key: String,
}

impl PostHogClient {
    pub fn new(config: PostHogConfig) -> Result<Self, AnalyticsError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalyticsError::Backend(e.to_string()))?;

        let host = config.host.trim_end_matches('/');
        tracing::info!(host, "posthog analytics enabled");

        Ok(Self {
            http,
            capture_url: format!("{host}/capture/"),
            api_key: config.api_key,
        })
    }
}

#[async_trait]
impl Analytics for PostHogClient {
    async fn capture(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        let payload = CapturePayload {
            api_key: &self.api_key,
            event: event.event.as_str(),
            distinct_id: &event.distinct_id,
            properties: &event.properties,
            timestamp: Utc::now().to_rfc3339(),
        };

        let response = self
            .http
            .post(&self.capture_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AnalyticsError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalyticsError::Rejected {
                status: status.as_u16(),
            });
        }
        tracing::debug!(event = %event.event, "posthog event captured");
        Ok(())
    }
}
