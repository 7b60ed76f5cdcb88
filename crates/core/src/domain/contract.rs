use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// What a provider gateway hands to the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Parsed(ProviderPayload),
    /// The provider answered but nothing usable could be decoded.
    Degraded { reason: String, raw_text: String },
}

impl RawResponse {
    pub fn degraded(reason: impl Into<String>, raw_text: impl Into<String>) -> Self {
        RawResponse::Degraded {
            reason: reason.into(),
            raw_text: raw_text.into(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, RawResponse::Degraded { .. })
    }
}

/// Structured answer requested from every provider. Decoding is lenient: missing lists are
/// empty, numbers may arrive as strings, and scalars of the wrong type decay to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    #[serde(rename = "marketOutlook", default, deserialize_with = "lenient_string")]
    pub market_outlook: String,

    #[serde(
        rename = "managedRecommendations",
        alias = "existingHoldingsRecommendations",
        default,
        deserialize_with = "lenient_list"
    )]
    pub managed_recommendations: Vec<ManagedRecommendation>,

    #[serde(
        rename = "newStockSuggestions",
        alias = "newSuggestions",
        default,
        deserialize_with = "lenient_list"
    )]
    pub new_stock_suggestions: Vec<NewStockSuggestion>,

    #[serde(rename = "budgetSummary", default, deserialize_with = "lenient_object")]
    pub budget_summary: Option<ProviderBudgetSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedRecommendation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub shares: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reasoning: String,
}

/// Action is implicitly BUY.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStockSuggestion {
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub shares: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reasoning: String,
}

/// Only `decided_optimal_investment_ntd` is trusted; the totals are recomputed downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderBudgetSummary {
    #[serde(
        rename = "userProvidedMonthlyCapacityNTD",
        default,
        deserialize_with = "lenient_number"
    )]
    pub user_provided_capacity_ntd: f64,
    #[serde(
        rename = "decidedOptimalInvestmentNTD",
        default,
        deserialize_with = "lenient_number"
    )]
    pub decided_optimal_investment_ntd: f64,
    #[serde(rename = "totalSpentOnBuysNTD", default, deserialize_with = "lenient_number")]
    pub total_spent_on_buys_ntd: f64,
    #[serde(
        rename = "totalGainedFromSellsNTD",
        default,
        deserialize_with = "lenient_number"
    )]
    pub total_gained_from_sells_ntd: f64,
    #[serde(rename = "netInvestmentNTD", default, deserialize_with = "lenient_number")]
    pub net_investment_ntd: f64,
    #[serde(
        rename = "remainingUnallocatedNTD",
        default,
        deserialize_with = "lenient_number"
    )]
    pub remaining_unallocated_ntd: f64,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value))
}

/// Entries that are not objects are skipped rather than failing the whole payload.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value::<T>(item).ok())
        .collect())
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    Ok(serde_json::from_value::<T>(value).ok())
}

fn number_from_value(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .replace(',', "")
            .parse::<f64>()
            .unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}
