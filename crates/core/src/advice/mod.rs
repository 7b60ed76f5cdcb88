use crate::domain::advice::Advice;
use crate::llm::error::ProviderErrorKind;
use crate::storage::records::RecordOutcome;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

pub mod aggregator;
pub mod normalize;
pub mod pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    Transport,
    RateLimit,
    Unavailable,
    /// The provider answered but the answer was undecodable.
    Malformed,
    /// Advice was produced but could not be written to the ledger.
    Record,
    Other,
}

impl From<ProviderErrorKind> for FailureKind {
    fn from(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Transport => FailureKind::Transport,
            ProviderErrorKind::RateLimit => FailureKind::RateLimit,
            ProviderErrorKind::Unavailable => FailureKind::Unavailable,
            ProviderErrorKind::Malformed => FailureKind::Malformed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Advice that was built but not kept: the degraded advice for `Malformed`, the
    /// normalized advice for `Record`.
    pub partial_advice: Option<Advice>,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome for one provider. Exactly one of `advice` / `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRunResult {
    pub provider_name: String,
    pub advice: Option<Advice>,
    pub error: Option<ProviderFailure>,
    pub ledger: Option<RecordOutcome>,
}

impl ProviderRunResult {
    pub fn succeeded(&self) -> bool {
        self.advice.is_some()
    }
}

/// Compact per-provider line for run summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderOutcome {
    pub provider_name: String,
    pub success: bool,
    pub error: Option<String>,
    pub ledger: Option<RecordOutcome>,
}

impl From<&ProviderRunResult> for ProviderOutcome {
    fn from(result: &ProviderRunResult) -> Self {
        Self {
            provider_name: result.provider_name.clone(),
            success: result.succeeded(),
            error: result.error.as_ref().map(ToString::to_string),
            ledger: result.ledger,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub results: Vec<ProviderRunResult>,
}

impl RunReport {
    /// At least one provider produced advice.
    pub fn succeeded(&self) -> bool {
        self.results.iter().any(ProviderRunResult::succeeded)
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn outcomes(&self) -> Vec<ProviderOutcome> {
        self.results.iter().map(ProviderOutcome::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, failure: Option<FailureKind>) -> ProviderRunResult {
        ProviderRunResult {
            provider_name: name.to_string(),
            advice: None,
            error: failure.map(|kind| ProviderFailure {
                kind,
                message: "boom".to_string(),
                partial_advice: None,
            }),
            ledger: None,
        }
    }

    #[test]
    fn report_succeeds_when_any_provider_produced_advice() {
        let now = Local::now();
        let mut report = RunReport {
            run_id: uuid::Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            results: vec![
                result("a", Some(FailureKind::RateLimit)),
                result("b", Some(FailureKind::Transport)),
            ],
        };
        assert!(!report.succeeded());

        report.results[1].advice = Some(crate::domain::advice::Advice {
            provider_name: "b".to_string(),
            generated_at: now.date_naive(),
            market_outlook: String::new(),
            managed_actions: Vec::new(),
            new_suggestions: Vec::new(),
            budget: crate::domain::advice::BudgetSummary::zero(0.0),
            parse_failure: None,
        });
        report.results[1].error = None;
        assert!(report.succeeded());
        assert_eq!(report.success_count(), 1);

        let outcomes = report.outcomes();
        assert_eq!(outcomes[0].error.as_deref(), Some("RateLimit: boom"));
        assert!(outcomes[1].success);
    }
}
