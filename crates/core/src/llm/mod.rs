use crate::domain::contract::RawResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod error;
pub mod json;
pub mod openai_compat;
pub mod prompt;

/// One configured AI backend. `name` doubles as the ledger key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl ProviderConfig {
    pub fn is_usable(&self) -> bool {
        [&self.name, &self.model, &self.base_url, &self.api_key]
            .iter()
            .all(|s| !s.trim().is_empty())
    }
}

// Keeps api keys out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff after a rate-limited attempt: 5s, 10s, 15s with the default base.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Fails with a [`error::ProviderError`] for transport, rate-limit and availability
    /// problems. Undecodable answers are returned as [`RawResponse::Degraded`], not errors.
    async fn invoke(&self, config: &ProviderConfig, prompt: &str) -> anyhow::Result<RawResponse>;
}
