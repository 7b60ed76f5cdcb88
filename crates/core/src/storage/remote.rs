use crate::storage::{DocumentKey, DocumentStore};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the document endpoints served by the api binary.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    success: bool,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackupsResponse {
    success: bool,
    #[serde(default)]
    backups: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    content: &'a str,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let timeout_secs = std::env::var("ADVICE_STORE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build document store http client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, key: DocumentKey, suffix: &str) -> String {
        format!("{}/api/{}{}", self.base_url, key.stem(), suffix)
    }
}

#[async_trait::async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn read(&self, key: DocumentKey) -> anyhow::Result<String> {
        let res = self
            .http
            .get(self.url(key, ""))
            .send()
            .await
            .with_context(|| format!("document store request failed ({key})"))?;
        let status = res.status();
        let body: DocumentResponse = res
            .json()
            .await
            .with_context(|| format!("document store returned non-JSON body ({key}, {status})"))?;
        anyhow::ensure!(
            body.success,
            "document store read failed ({key}, {status}): {}",
            body.error.unwrap_or_default()
        );
        Ok(body.content.unwrap_or_default())
    }

    async fn write(&self, key: DocumentKey, text: &str) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url(key, "/update"))
            .json(&UpdateRequest { content: text })
            .send()
            .await
            .with_context(|| format!("document store update failed ({key})"))?;
        let status = res.status();
        let body: DocumentResponse = res
            .json()
            .await
            .with_context(|| format!("document store returned non-JSON body ({key}, {status})"))?;
        anyhow::ensure!(
            body.success,
            "document store write failed ({key}, {status}): {}",
            body.error.unwrap_or_default()
        );
        Ok(())
    }

    async fn list_backups(&self, key: DocumentKey) -> anyhow::Result<Vec<String>> {
        let res = self
            .http
            .get(self.url(key, "/backups"))
            .send()
            .await
            .with_context(|| format!("document store backup listing failed ({key})"))?;
        let status = res.status();
        let body: BackupsResponse = res
            .json()
            .await
            .with_context(|| format!("document store returned non-JSON body ({key}, {status})"))?;
        anyhow::ensure!(
            body.success,
            "document store backup listing failed ({key}, {status}): {}",
            body.error.unwrap_or_default()
        );
        Ok(body.backups)
    }
}
