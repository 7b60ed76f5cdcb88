use crate::advice::aggregator::{AdviceAggregator, AggregatorOptions};
use crate::advice::RunReport;
use crate::catalog::{MarkdownProviderCatalog, ProviderCatalog};
use crate::config::Settings;
use crate::ingest::universe::reference_quotes;
use crate::ingest::warehouse::WarehousePortfolio;
use crate::ingest::PortfolioSource;
use crate::llm::openai_compat::OpenAiCompatGateway;
use crate::scheduler::ScheduledJob;
use crate::storage::records::AdviceRecordStore;
use crate::storage::DocumentStore;
use anyhow::Context;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::Instrument;

/// One full advice round: providers, portfolio snapshot, fan-out, retention sweep.
#[derive(Clone)]
pub struct AdvicePipeline {
    catalog: Arc<dyn ProviderCatalog>,
    portfolio: Arc<dyn PortfolioSource>,
    aggregator: AdviceAggregator,
    records: AdviceRecordStore,
    retention_days: i64,
}

impl AdvicePipeline {
    pub fn new(
        catalog: Arc<dyn ProviderCatalog>,
        portfolio: Arc<dyn PortfolioSource>,
        aggregator: AdviceAggregator,
        records: AdviceRecordStore,
        retention_days: i64,
    ) -> Self {
        Self {
            catalog,
            portfolio,
            aggregator,
            records,
            retention_days,
        }
    }

    /// Production wiring: markdown catalog, OpenAI-compatible gateway, holdings and ledger
    /// in `store`.
    pub fn from_settings(settings: &Settings, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let gateway = OpenAiCompatGateway::from_settings(settings)?;
        let records = AdviceRecordStore::new(store.clone());
        let aggregator = AdviceAggregator::new(
            Arc::new(gateway),
            records.clone(),
            AggregatorOptions::from_settings(settings),
        );
        Ok(Self::new(
            Arc::new(MarkdownProviderCatalog::new(settings.providers_file.clone())),
            Arc::new(WarehousePortfolio::new(store, reference_quotes())),
            aggregator,
            records,
            settings.retention_days,
        ))
    }

    pub fn records(&self) -> &AdviceRecordStore {
        &self.records
    }

    pub async fn run(&self) -> anyhow::Result<RunReport> {
        self.execute(None).await
    }

    /// Same round restricted to one catalog entry.
    pub async fn run_single(&self, provider_name: &str) -> anyhow::Result<RunReport> {
        self.execute(Some(provider_name)).await
    }

    async fn execute(&self, only: Option<&str>) -> anyhow::Result<RunReport> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("advice_run", %run_id, only = only.unwrap_or("*"));
        async move {
            let started_at = chrono::Local::now();

            let mut providers = self
                .catalog
                .load_providers()
                .await
                .context("failed to load provider catalog")?;
            anyhow::ensure!(!providers.is_empty(), "no usable AI providers configured");
            if let Some(name) = only {
                providers.retain(|p| p.name == name);
                anyhow::ensure!(!providers.is_empty(), "provider {name} is not in the catalog");
            }

            let holdings = self
                .portfolio
                .load_holdings()
                .await
                .context("failed to load holdings")?;
            let symbols: Vec<String> = holdings
                .iter()
                .map(|h| h.symbol.clone())
                .chain(self.portfolio.candidate_symbols())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let quotes = self
                .portfolio
                .load_quotes(&symbols)
                .await
                .context("failed to load quotes")?;

            tracing::info!(
                providers = providers.len(),
                holdings = holdings.len(),
                quotes = quotes.len(),
                "advice run started"
            );

            let results = self.aggregator.run_all(&providers, &holdings, &quotes).await;

            if let Err(err) = self.records.prune_older_than(self.retention_days).await {
                tracing::warn!(error = %err, "advice ledger prune failed");
            }

            let report = RunReport {
                run_id,
                started_at,
                finished_at: chrono::Local::now(),
                results,
            };
            tracing::info!(
                succeeded = report.success_count(),
                total = report.results.len(),
                "advice run finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[async_trait::async_trait]
impl ScheduledJob for AdvicePipeline {
    async fn run(&self) -> anyhow::Result<RunReport> {
        AdvicePipeline::run(self).await
    }
}
