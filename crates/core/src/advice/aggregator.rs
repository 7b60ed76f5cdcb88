use crate::advice::normalize::{normalize, NormalizeContext};
use crate::advice::{FailureKind, ProviderFailure, ProviderRunResult};
use crate::config::Settings;
use crate::domain::portfolio::{Holding, QuoteBook};
use crate::llm::error::ProviderError;
use crate::llm::prompt::{build_prompt, PromptInput};
use crate::llm::{ProviderConfig, ProviderGateway};
use crate::storage::records::AdviceRecordStore;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorOptions {
    /// Pause between two consecutive providers.
    pub provider_delay: Duration,
    pub user_capacity_ntd: f64,
    pub min_investment_ntd: f64,
}

impl AggregatorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            provider_delay: settings.provider_delay,
            user_capacity_ntd: settings.user_capacity_ntd,
            min_investment_ntd: settings.min_investment_ntd,
        }
    }
}

/// Calls every provider in turn, normalizes each answer and records the actionable ones.
#[derive(Clone)]
pub struct AdviceAggregator {
    gateway: Arc<dyn ProviderGateway>,
    records: AdviceRecordStore,
    options: AggregatorOptions,
}

impl AdviceAggregator {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        records: AdviceRecordStore,
        options: AggregatorOptions,
    ) -> Self {
        Self {
            gateway,
            records,
            options,
        }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    pub async fn run_all(
        &self,
        providers: &[ProviderConfig],
        holdings: &[Holding],
        quotes: &QuoteBook,
    ) -> Vec<ProviderRunResult> {
        let today = chrono::Local::now().date_naive();
        self.run_all_as_of(providers, holdings, quotes, today).await
    }

    /// Sequential on purpose: providers often share upstream quotas. One provider's
    /// failure never stops the rest.
    pub async fn run_all_as_of(
        &self,
        providers: &[ProviderConfig],
        holdings: &[Holding],
        quotes: &QuoteBook,
        as_of: NaiveDate,
    ) -> Vec<ProviderRunResult> {
        let mut results = Vec::with_capacity(providers.len());
        for (idx, provider) in providers.iter().enumerate() {
            if idx > 0 && !self.options.provider_delay.is_zero() {
                tokio::time::sleep(self.options.provider_delay).await;
            }

            tracing::info!(
                provider = %provider.name,
                model = %provider.model,
                position = idx + 1,
                total = providers.len(),
                "requesting advice"
            );
            let result = self.run_one(provider, holdings, quotes, as_of).await;
            match &result.error {
                None => tracing::info!(
                    provider = %provider.name,
                    ledger = ?result.ledger,
                    "provider succeeded"
                ),
                Some(failure) => tracing::error!(
                    provider = %provider.name,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "provider failed"
                ),
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        tracing::info!(
            succeeded,
            failed = results.len() - succeeded,
            "advice round finished"
        );
        results
    }

    async fn run_one(
        &self,
        provider: &ProviderConfig,
        holdings: &[Holding],
        quotes: &QuoteBook,
        as_of: NaiveDate,
    ) -> ProviderRunResult {
        let prompt = build_prompt(&PromptInput {
            model: &provider.model,
            user_capacity_ntd: self.options.user_capacity_ntd,
            holdings,
            quotes,
        });

        let raw = match self.gateway.invoke(provider, &prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                let kind = err
                    .downcast_ref::<ProviderError>()
                    .map(|e| FailureKind::from(e.kind))
                    .unwrap_or(FailureKind::Other);
                return failed(provider, kind, format!("{err:#}"), None);
            }
        };

        let advice = normalize(
            &raw,
            &NormalizeContext {
                provider_name: &provider.name,
                as_of,
                user_capacity_ntd: self.options.user_capacity_ntd,
                min_investment_ntd: self.options.min_investment_ntd,
                holdings,
                quotes,
            },
        );

        if let Some(reason) = advice.parse_failure.clone() {
            return failed(provider, FailureKind::Malformed, reason, Some(advice));
        }

        match self.records.record(&advice).await {
            Ok(outcome) => ProviderRunResult {
                provider_name: provider.name.clone(),
                advice: Some(advice),
                error: None,
                ledger: Some(outcome),
            },
            Err(err) => failed(provider, FailureKind::Record, format!("{err:#}"), Some(advice)),
        }
    }
}

fn failed(
    provider: &ProviderConfig,
    kind: FailureKind,
    message: String,
    partial_advice: Option<crate::domain::advice::Advice>,
) -> ProviderRunResult {
    ProviderRunResult {
        provider_name: provider.name.clone(),
        advice: None,
        error: Some(ProviderFailure {
            kind,
            message,
            partial_advice,
        }),
        ledger: None,
    }
}
