use crate::config::Settings;
use crate::domain::contract::RawResponse;
use crate::llm::error::{ProviderError, ProviderErrorKind};
use crate::llm::json;
use crate::llm::{ProviderConfig, ProviderGateway, RetryPolicy};
use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: u32 = 8000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Gateway for OpenAI-compatible `chat/completions` endpoints (OpenRouter and friends).
#[derive(Debug, Clone)]
pub struct OpenAiCompatGateway {
    http: reqwest::Client,
    retry: RetryPolicy,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatGateway {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let mut gateway = Self::new(settings.provider_timeout)?;
        gateway.max_tokens = settings.provider_max_tokens;
        gateway.retry = RetryPolicy {
            max_attempts: settings.provider_max_attempts,
            base_delay: settings.provider_retry_base,
        };
        Ok(gateway)
    }

    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build provider http client")?;

        Ok(Self {
            http,
            retry: RetryPolicy::default(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn url(config: &ProviderConfig) -> String {
        format!("{}/chat/completions", config.base_url.trim_end_matches('/'))
    }

    /// One HTTP round trip. Returns the completion text, or a degraded response when the
    /// envelope itself cannot be decoded.
    async fn send_once(
        &self,
        config: &ProviderConfig,
        prompt: &str,
    ) -> Result<RawResponse, ProviderError> {
        let req = ChatCompletionRequest {
            model: &config.model,
            messages: vec![ChatMessageRequest {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let res = self
            .http
            .post(Self::url(config))
            .bearer_auth(&config.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|err| {
                ProviderError::new(
                    &config.name,
                    ProviderErrorKind::Transport,
                    "send",
                    format!("request failed: {err}"),
                )
            })?;

        let status = res.status();
        let text = res.text().await.map_err(|err| {
            ProviderError::new(
                &config.name,
                ProviderErrorKind::Transport,
                "read_body",
                format!("failed to read response body: {err}"),
            )
        })?;

        if !status.is_success() {
            let kind = match status {
                StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimit,
                StatusCode::SERVICE_UNAVAILABLE => ProviderErrorKind::Unavailable,
                _ => ProviderErrorKind::Transport,
            };
            return Err(
                ProviderError::new(&config.name, kind, "http", format!("status={status}"))
                    .with_raw_output(text),
            );
        }

        let envelope = match serde_json::from_str::<ChatCompletionResponse>(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                return Ok(RawResponse::degraded(
                    format!("response envelope is not valid JSON: {err}"),
                    text,
                ))
            }
        };

        Ok(json::decode_payload(&envelope.completion_text()))
    }
}

#[async_trait::async_trait]
impl ProviderGateway for OpenAiCompatGateway {
    async fn invoke(&self, config: &ProviderConfig, prompt: &str) -> anyhow::Result<RawResponse> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(provider = %config.name, attempt, max_attempts, "invoking provider");

            let err = match self.send_once(config, prompt).await {
                Ok(raw) => {
                    if let RawResponse::Degraded { reason, .. } = &raw {
                        tracing::warn!(provider = %config.name, %reason, "provider response degraded");
                    }
                    return Ok(raw);
                }
                Err(err) => err,
            };

            if err.kind != ProviderErrorKind::RateLimit {
                tracing::warn!(provider = %config.name, attempt, error = %err, "provider call failed");
                return Err(err.into());
            }

            if attempt >= max_attempts {
                let raw_output = err.raw_output.clone();
                let mut exhausted = ProviderError::new(
                    &config.name,
                    ProviderErrorKind::RateLimit,
                    "retries_exhausted",
                    format!("rate limited on all {max_attempts} attempts; last error: {err}"),
                );
                exhausted.raw_output = raw_output;
                return Err(exhausted.into());
            }

            let backoff = self.retry.backoff_for(attempt);
            tracing::warn!(
                provider = %config.name,
                attempt,
                ?backoff,
                "provider rate limited; retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    // Some reasoning models leave `content` empty and answer here.
    #[serde(default)]
    reasoning: Option<String>,
}

impl ChatCompletionResponse {
    fn completion_text(&self) -> String {
        let Some(message) = self.choices.first().and_then(|c| c.message.as_ref()) else {
            return String::new();
        };
        match message.content.as_deref().map(str::trim) {
            Some(content) if !content.is_empty() => content.to_string(),
            _ => message.reasoning.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MockProvider {
        replies: Arc<Mutex<VecDeque<(u16, String)>>>,
        hits: Arc<Mutex<u32>>,
    }

    async fn chat_completions(
        State(mock): State<MockProvider>,
        Json(_body): Json<Value>,
    ) -> (AxumStatus, String) {
        *mock.hits.lock().unwrap() += 1;
        let (status, body) = mock
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, "no more replies".to_string()));
        (AxumStatus::from_u16(status).unwrap(), body)
    }

    async fn start_mock(replies: Vec<(u16, String)>) -> (ProviderConfig, MockProvider) {
        let mock = MockProvider {
            replies: Arc::new(Mutex::new(replies.into())),
            hits: Arc::new(Mutex::new(0)),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = ProviderConfig {
            name: "Mock".to_string(),
            model: "mock/model".to_string(),
            base_url: format!("http://{addr}/v1"),
            api_key: "test-key".to_string(),
        };
        (config, mock)
    }

    fn completion(content: &str) -> String {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
    }

    fn gateway() -> OpenAiCompatGateway {
        OpenAiCompatGateway::new(Duration::from_secs(5))
            .unwrap()
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            })
    }

    fn provider_error(err: &anyhow::Error) -> &ProviderError {
        err.downcast_ref::<ProviderError>()
            .expect("expected ProviderError")
    }

    #[tokio::test]
    async fn retries_rate_limits_then_succeeds() {
        let ok = completion("{\"marketOutlook\":\"ok\",\"managedRecommendations\":[]}");
        let (config, mock) = start_mock(vec![
            (429, "slow down".to_string()),
            (429, "slow down".to_string()),
            (200, ok),
        ])
        .await;

        let raw = gateway().invoke(&config, "prompt").await.unwrap();
        assert!(matches!(raw, RawResponse::Parsed(ref p) if p.market_outlook == "ok"));
        assert_eq!(*mock.hits.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_surfaces_rate_limit_error() {
        let (config, mock) = start_mock(vec![
            (429, "a".to_string()),
            (429, "b".to_string()),
            (429, "c".to_string()),
        ])
        .await;

        let err = gateway().invoke(&config, "prompt").await.unwrap_err();
        let err = provider_error(&err);
        assert_eq!(err.kind, ProviderErrorKind::RateLimit);
        assert_eq!(err.raw_output.as_deref(), Some("c"));
        assert_eq!(*mock.hits.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn service_unavailable_fails_without_retry() {
        let (config, mock) = start_mock(vec![(503, "down".to_string())]).await;

        let err = gateway().invoke(&config, "prompt").await.unwrap_err();
        assert_eq!(provider_error(&err).kind, ProviderErrorKind::Unavailable);
        assert_eq!(*mock.hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn other_http_errors_fail_without_retry() {
        let (config, mock) = start_mock(vec![(401, "bad key".to_string())]).await;

        let err = gateway().invoke(&config, "prompt").await.unwrap_err();
        assert_eq!(provider_error(&err).kind, ProviderErrorKind::Transport);
        assert_eq!(*mock.hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn unparsable_content_is_degraded_not_an_error() {
        let (config, _mock) =
            start_mock(vec![(200, completion("The market is uncertain, sorry."))]).await;

        let raw = gateway().invoke(&config, "prompt").await.unwrap();
        assert!(raw.is_degraded());
    }

    #[tokio::test]
    async fn falls_back_to_reasoning_field() {
        let body = json!({
            "choices": [{"message": {
                "content": "",
                "reasoning": "thinking... {\"marketOutlook\":\"from reasoning\"}"
            }}]
        })
        .to_string();
        let (config, _mock) = start_mock(vec![(200, body)]).await;

        let raw = gateway().invoke(&config, "prompt").await.unwrap();
        assert!(matches!(raw, RawResponse::Parsed(ref p) if p.market_outlook == "from reasoning"));
    }

    #[test]
    fn from_settings_uses_configured_provider_knobs() {
        let settings = Settings {
            provider_max_tokens: 2048,
            provider_max_attempts: 5,
            provider_retry_base: Duration::from_secs(2),
            ..Settings::default()
        };

        let gateway = OpenAiCompatGateway::from_settings(&settings).unwrap();
        assert_eq!(gateway.max_tokens, 2048);
        assert_eq!(
            gateway.retry_policy(),
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn completion_text_handles_missing_choices() {
        let res: ChatCompletionResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(res.completion_text(), "");
    }
}
