//! Server configuration from environment variables.
//!
//! ```bash
//! # Analytics (off unless a PostHog key is present)
//! TELEMETRY_ENABLED=true           # enabled by default
//! POSTHOG_PROJECT_API_KEY=phc_...
//! POSTHOG_HOST=https://app.posthog.com
//! POSTHOG_TIMEOUT_SECS=5
//!
//! # HTTP
//! STASH_MAX_BODY_BYTES=2097152
//! ```

use stash_analytics_posthog::{PostHogConfig, DEFAULT_HOST};
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_POSTHOG_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `None` means analytics are off and no event is ever built.
    pub posthog: Option<PostHogConfig>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            posthog: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let telemetry_enabled = env::var("TELEMETRY_ENABLED")
            .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
            .unwrap_or(true);

        let max_body_bytes = parse_var("STASH_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        let api_key = env::var("POSTHOG_PROJECT_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let posthog = match api_key {
            Some(api_key) if telemetry_enabled => {
                let host = env::var("POSTHOG_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
                let timeout_secs =
                    parse_var("POSTHOG_TIMEOUT_SECS", DEFAULT_POSTHOG_TIMEOUT_SECS)?;
                Some(PostHogConfig {
                    api_key,
                    host,
                    timeout: Duration::from_secs(timeout_secs),
                })
            }
            _ => None,
        };

        Ok(Self {
            posthog,
            max_body_bytes,
        })
    }

    pub fn analytics_enabled(&self) -> bool {
        self.posthog.is_some()
    }
}
