//! Readiness probing for stubs and external resources

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::ResourceError;

/// Readiness check configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Attempts before a resource is declared unreachable
    pub attempts: u32,

    /// Delay between attempts
    pub interval_ms: u64,

    /// Timeout for a single health request
    pub timeout_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval_ms: 100,
            timeout_secs: 2,
        }
    }
}

impl ReadinessConfig {
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms;
        self
    }
}

/// Polls a health URL until it answers 2xx
pub struct ReadinessCheck {
    config: ReadinessConfig,
    client: Client,
}

impl ReadinessCheck {
    pub fn new(config: ReadinessConfig) -> Result<Self, ResourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResourceError::Client(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// Wait for `url` to become healthy
    pub async fn wait_ready(&self, name: &str, url: &str) -> Result<(), ResourceError> {
        let attempts = self.config.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!("{} ready after {} attempt(s)", name, attempt);
                    return Ok(());
                }
                Ok(response) => last_error = format!("status {}", response.status()),
                Err(e) if e.is_timeout() => {
                    last_error = format!("timeout after {}s", self.config.timeout_secs)
                }
                Err(e) if e.is_connect() => last_error = "connection refused".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            if attempt < attempts {
                sleep(Duration::from_millis(self.config.interval_ms)).await;
            }
        }

        Err(ResourceError::Unreachable {
            name: name.to_string(),
            url: url.to_string(),
            reason: format!("{last_error} ({attempts} attempts)"),
        })
    }
}
