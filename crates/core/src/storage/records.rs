use crate::domain::advice::Advice;
use crate::storage::ledger::{Ledger, LedgerEntry, UpsertOutcome};
use crate::storage::{DocumentKey, DocumentStore};
use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordOutcome {
    Inserted,
    Replaced,
    /// HOLD-only advice is never persisted.
    SkippedNoAction,
}

impl From<UpsertOutcome> for RecordOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => RecordOutcome::Inserted,
            UpsertOutcome::Replaced => RecordOutcome::Replaced,
        }
    }
}

/// Read-modify-write of the whole advice document. Assumes a single writer.
#[derive(Clone)]
pub struct AdviceRecordStore {
    store: Arc<dyn DocumentStore>,
}

impl AdviceRecordStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn read(&self) -> anyhow::Result<String> {
        self.store
            .read(DocumentKey::Advice)
            .await
            .context("failed to read advice ledger")
    }

    pub async fn load(&self) -> anyhow::Result<Ledger> {
        Ok(Ledger::parse(&self.read().await?))
    }

    pub async fn upsert(&self, entry: LedgerEntry) -> anyhow::Result<UpsertOutcome> {
        let key = entry.key().clone();
        let mut ledger = self.load().await?;
        let outcome = ledger.upsert(entry);
        self.store
            .write(DocumentKey::Advice, &ledger.render())
            .await
            .context("failed to write advice ledger")?;

        tracing::info!(
            date = %key.date,
            provider = %key.provider,
            ?outcome,
            "advice ledger entry written"
        );
        Ok(outcome)
    }

    pub async fn record(&self, advice: &Advice) -> anyhow::Result<RecordOutcome> {
        let Some(entry) = LedgerEntry::from_advice(advice) else {
            tracing::info!(
                provider = %advice.provider_name,
                "no BUY/SELL or new suggestion; ledger left unchanged"
            );
            return Ok(RecordOutcome::SkippedNoAction);
        };
        Ok(self.upsert(entry).await?.into())
    }

    pub async fn prune_older_than(&self, days: i64) -> anyhow::Result<usize> {
        self.prune_older_than_as_of(days, chrono::Local::now().date_naive())
            .await
    }

    /// Keeps sections dated on or after `today - days`. Writes only when something was removed.
    pub async fn prune_older_than_as_of(
        &self,
        days: i64,
        today: NaiveDate,
    ) -> anyhow::Result<usize> {
        anyhow::ensure!(days >= 0, "retention days must be >= 0 (got {days})");
        let cutoff = today - Duration::days(days);

        let mut ledger = self.load().await?;
        let removed = ledger.prune_before(cutoff);
        if removed > 0 {
            self.store
                .write(DocumentKey::Advice, &ledger.render())
                .await
                .context("failed to write pruned advice ledger")?;
            tracing::info!(%cutoff, removed, "pruned advice ledger");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::advice::{Action, BudgetSummary, RecommendedAction};
    use crate::domain::portfolio::StockCategory;
    use crate::storage::ledger::EntryKey;
    use crate::storage::memory::MemoryDocumentStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn advice(provider: &str, on: NaiveDate, action: Action, shares: u64) -> Advice {
        Advice {
            provider_name: provider.to_string(),
            generated_at: on,
            market_outlook: format!("{provider} outlook {shares}"),
            managed_actions: vec![RecommendedAction {
                symbol: "AAPL".to_string(),
                name: "Apple Inc.".to_string(),
                category: StockCategory::UsStock,
                current_price: 6175.0,
                action,
                shares,
                reasoning: "rebalance".to_string(),
                allocated_amount: shares as f64 * 6175.0,
                current_holding_shares: 10,
            }],
            new_suggestions: Vec::new(),
            budget: BudgetSummary::zero(20000.0),
            parse_failure: None,
        }
    }

    fn store() -> (Arc<MemoryDocumentStore>, AdviceRecordStore) {
        let docs = Arc::new(MemoryDocumentStore::new());
        let records = AdviceRecordStore::new(docs.clone());
        (docs, records)
    }

    #[tokio::test]
    async fn rerun_same_day_leaves_one_section_with_latest_content() {
        let (_docs, records) = store();
        let today = date(2026, 10, 19);

        let first = records
            .record(&advice("Gemini", today, Action::Buy, 1))
            .await
            .unwrap();
        let second = records
            .record(&advice("Gemini", today, Action::Sell, 3))
            .await
            .unwrap();
        assert_eq!(first, RecordOutcome::Inserted);
        assert_eq!(second, RecordOutcome::Replaced);

        let ledger = records.load().await.unwrap();
        assert_eq!(ledger.sections().len(), 1);
        let section = ledger.get(&EntryKey::new(today, "Gemini")).unwrap();
        assert!(section.body.contains("Gemini outlook 3"));
        assert!(section.body.contains("SELL 3 shares"));
    }

    #[tokio::test]
    async fn hold_only_advice_writes_nothing() {
        let (docs, records) = store();
        let outcome = records
            .record(&advice("Gemini", date(2026, 10, 19), Action::Hold, 0))
            .await
            .unwrap();
        assert_eq!(outcome, RecordOutcome::SkippedNoAction);
        assert_eq!(docs.write_count(), 0);
        assert_eq!(records.read().await.unwrap(), "");
    }

    #[tokio::test]
    async fn new_day_prepends() {
        let (_docs, records) = store();
        records
            .record(&advice("A", date(2026, 10, 18), Action::Buy, 1))
            .await
            .unwrap();
        records
            .record(&advice("A", date(2026, 10, 19), Action::Buy, 1))
            .await
            .unwrap();

        let ledger = records.load().await.unwrap();
        let dates: Vec<_> = ledger
            .sections()
            .iter()
            .map(|s| s.key.as_ref().unwrap().date)
            .collect();
        assert_eq!(dates, vec![date(2026, 10, 19), date(2026, 10, 18)]);
    }

    #[tokio::test]
    async fn prune_drops_only_the_31_day_old_section() {
        let (docs, records) = store();
        let today = date(2026, 10, 19);
        for days_ago in [31, 29, 0] {
            records
                .record(&advice("A", today - Duration::days(days_ago), Action::Buy, 1))
                .await
                .unwrap();
        }
        let writes_before = docs.write_count();

        let removed = records.prune_older_than_as_of(30, today).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(docs.write_count(), writes_before + 1);

        let ledger = records.load().await.unwrap();
        let dates: Vec<_> = ledger
            .sections()
            .iter()
            .map(|s| s.key.as_ref().unwrap().date)
            .collect();
        assert_eq!(dates, vec![today, today - Duration::days(29)]);

        // Nothing left to prune: no write.
        assert_eq!(records.prune_older_than_as_of(30, today).await.unwrap(), 0);
        assert_eq!(docs.write_count(), writes_before + 1);
    }
}
