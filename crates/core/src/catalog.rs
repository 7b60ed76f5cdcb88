//! Provider catalog: the list of AI backends to consult on every run.
//!
//! The catalog document is markdown with one `###` section per provider:
//!
//! ```text
//! ### DeepSeek
//! model="deepseek/deepseek-chat"
//! base_url="https://openrouter.ai/api/v1"
//! api_key = "sk-..."
//! ```

use crate::llm::ProviderConfig;
use anyhow::Context;
use std::collections::HashSet;
use std::path::PathBuf;

#[async_trait::async_trait]
pub trait ProviderCatalog: Send + Sync {
    async fn load_providers(&self) -> anyhow::Result<Vec<ProviderConfig>>;
}

#[derive(Debug, Clone)]
pub struct MarkdownProviderCatalog {
    path: PathBuf,
}

impl MarkdownProviderCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ProviderCatalog for MarkdownProviderCatalog {
    async fn load_providers(&self) -> anyhow::Result<Vec<ProviderConfig>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read provider catalog {}", self.path.display()))?;
        Ok(parse_provider_catalog(&text))
    }
}

/// Fixed provider list, for callers that configure providers in code.
#[derive(Debug, Clone, Default)]
pub struct StaticProviderCatalog {
    providers: Vec<ProviderConfig>,
}

impl StaticProviderCatalog {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }
}

#[async_trait::async_trait]
impl ProviderCatalog for StaticProviderCatalog {
    async fn load_providers(&self) -> anyhow::Result<Vec<ProviderConfig>> {
        Ok(self
            .providers
            .iter()
            .filter(|p| p.is_usable())
            .cloned()
            .collect())
    }
}

/// Unusable sections (any field missing) are skipped; duplicate names keep the first.
pub fn parse_provider_catalog(text: &str) -> Vec<ProviderConfig> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for section in text.split("###").skip(1) {
        let mut lines = section.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some(name) = lines.next() else {
            continue;
        };

        let mut config = ProviderConfig {
            name: name.to_string(),
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
        };
        for line in lines {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().replace('"', "");
            match key.trim() {
                "model" => config.model = value,
                "base_url" => config.base_url = value,
                "api_key" => config.api_key = value,
                _ => {}
            }
        }

        if !config.is_usable() {
            tracing::warn!(provider = %config.name, "provider section incomplete; skipping");
            continue;
        }
        if !seen.insert(config.name.clone()) {
            tracing::warn!(provider = %config.name, "duplicate provider name; keeping the first");
            continue;
        }
        out.push(config);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"# AI providers

### DeepSeek
model="deepseek/deepseek-chat-v3-0324:free"
base_url="https://openrouter.ai/api/v1"
api_key = "sk-or-1"

### Gemini
model="google/gemini-2.0-flash-exp:free"
base_url="https://openrouter.ai/api/v1"

### Mistral
model="mistralai/mistral-7b-instruct:free"
base_url="https://openrouter.ai/api/v1"
api_key="sk-or-3"

### DeepSeek
model="other"
base_url="https://example.com"
api_key="sk-dup"
"#;

    #[test]
    fn parses_usable_sections_only() {
        let providers = parse_provider_catalog(CATALOG);
        let names: Vec<_> = providers.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["DeepSeek", "Mistral"]);
        assert_eq!(providers[0].model, "deepseek/deepseek-chat-v3-0324:free");
        assert_eq!(providers[0].base_url, "https://openrouter.ai/api/v1");
        assert_eq!(providers[0].api_key, "sk-or-1");
    }

    #[test]
    fn ignores_text_before_first_section() {
        assert!(parse_provider_catalog("just a note, no providers").is_empty());
    }

    #[tokio::test]
    async fn markdown_catalog_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.md");
        std::fs::write(&path, CATALOG).unwrap();

        let providers = MarkdownProviderCatalog::new(&path)
            .load_providers()
            .await
            .unwrap();
        assert_eq!(providers.len(), 2);
    }

    #[tokio::test]
    async fn missing_catalog_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = MarkdownProviderCatalog::new(dir.path().join("nope.md"))
            .load_providers()
            .await;
        assert!(res.is_err());
    }
}
