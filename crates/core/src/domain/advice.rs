use crate::domain::portfolio::StockCategory;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Case-insensitive; `None` for anything outside BUY/SELL/HOLD.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Action::Buy),
            "SELL" => Some(Action::Sell),
            "HOLD" => Some(Action::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, Action::Buy | Action::Sell)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub symbol: String,
    pub name: String,
    pub category: StockCategory,
    pub current_price: f64,
    pub action: Action,
    /// Always 0 for HOLD.
    pub shares: u64,
    pub reasoning: String,
    /// `shares * current_price` for BUY/SELL, 0 for HOLD.
    pub allocated_amount: f64,
    pub current_holding_shares: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub user_capacity_ntd: f64,
    /// Within `[0, user_capacity_ntd]`.
    pub decided_investment_ntd: f64,
    pub total_buy_ntd: f64,
    pub total_sell_ntd: f64,
    pub net_investment_ntd: f64,
    pub remaining_unallocated_ntd: f64,
}

impl BudgetSummary {
    pub fn zero(user_capacity_ntd: f64) -> Self {
        Self {
            user_capacity_ntd,
            decided_investment_ntd: 0.0,
            total_buy_ntd: 0.0,
            total_sell_ntd: 0.0,
            net_investment_ntd: 0.0,
            remaining_unallocated_ntd: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub provider_name: String,
    pub generated_at: NaiveDate,
    pub market_outlook: String,
    pub managed_actions: Vec<RecommendedAction>,
    pub new_suggestions: Vec<RecommendedAction>,
    pub budget: BudgetSummary,
    /// Set when the provider's answer could not be decoded.
    pub parse_failure: Option<String>,
}

impl Advice {
    pub fn is_degraded(&self) -> bool {
        self.parse_failure.is_some()
    }

    /// At least one BUY/SELL among managed holdings, or any new suggestion.
    pub fn is_actionable(&self) -> bool {
        self.managed_actions.iter().any(|a| a.action.is_trade()) || !self.new_suggestions.is_empty()
    }

    pub fn trade_actions(&self) -> impl Iterator<Item = &RecommendedAction> {
        self.managed_actions.iter().filter(|a| a.action.is_trade())
    }

    pub fn total_allocated_ntd(&self) -> f64 {
        self.trade_actions()
            .chain(self.new_suggestions.iter())
            .map(|a| a.allocated_amount)
            .sum()
    }
}
