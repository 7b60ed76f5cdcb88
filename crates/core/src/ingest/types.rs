use serde::{Deserialize, Serialize};

/// One line of the holdings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRow {
    pub symbol: String,
    pub shares: u64,
    pub name: Option<String>,
    pub current_price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub last_updated: Option<String>,
}
