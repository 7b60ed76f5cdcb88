use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProviderErrorKind {
    /// Network failure or an HTTP status other than 429/503.
    Transport,
    /// HTTP 429, still failing after the retry budget.
    RateLimit,
    /// HTTP 503. Not retried within a run.
    Unavailable,
    /// Answer could not be decoded.
    Malformed,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::Unavailable => "unavailable",
            ProviderErrorKind::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl ProviderError {
    pub fn new(
        provider: &str,
        kind: ProviderErrorKind,
        stage: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.to_string(),
            kind,
            stage,
            detail: detail.into(),
            raw_output: None,
        }
    }

    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provider error (provider={}, kind={}, stage={}): {}",
            self.provider, self.kind, self.stage, self.detail
        )
    }
}

impl std::error::Error for ProviderError {}
