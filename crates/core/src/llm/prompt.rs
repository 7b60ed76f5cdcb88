use crate::domain::portfolio::{Holding, QuoteBook};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub model: &'a str,
    pub user_capacity_ntd: f64,
    pub holdings: &'a [Holding],
    pub quotes: &'a QuoteBook,
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    if input.model.to_ascii_lowercase().contains("deepseek") {
        compact_prompt(input)
    } else {
        full_prompt(input)
    }
}

fn holdings_json(holdings: &[Holding]) -> String {
    let rows: Vec<_> = holdings
        .iter()
        .filter(|h| h.shares > 0)
        .map(|h| json!({"symbol": h.symbol, "shares": h.shares}))
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn quotes_json(quotes: &QuoteBook) -> String {
    let rows: Vec<_> = quotes
        .iter()
        .map(|q| {
            json!({
                "symbol": q.symbol,
                "name": q.name,
                "currentPrice": q.current_price,
                "category": q.category.as_str(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
}

fn schema(capacity: f64) -> String {
    [
        "{".to_string(),
        "  \"marketOutlook\": \"market analysis\",".to_string(),
        "  \"managedRecommendations\": [".to_string(),
        "    {\"symbol\": \"0050\", \"action\": \"BUY|SELL|HOLD\", \"shares\": 0, \"reasoning\": \"why\"}"
            .to_string(),
        "  ],".to_string(),
        "  \"newStockSuggestions\": [".to_string(),
        "    {\"symbol\": \"2330\", \"shares\": 0, \"reasoning\": \"why\"}".to_string(),
        "  ],".to_string(),
        "  \"budgetSummary\": {".to_string(),
        format!("    \"userProvidedMonthlyCapacityNTD\": {capacity:.0},"),
        "    \"decidedOptimalInvestmentNTD\": 0,".to_string(),
        "    \"totalSpentOnBuysNTD\": 0,".to_string(),
        "    \"totalGainedFromSellsNTD\": 0,".to_string(),
        "    \"netInvestmentNTD\": 0,".to_string(),
        "    \"remainingUnallocatedNTD\": 0".to_string(),
        "  }".to_string(),
        "}".to_string(),
    ]
    .join("\n")
}

fn compact_prompt(input: &PromptInput<'_>) -> String {
    format!(
        "You are a Taiwan stock market investment adviser. Monthly budget: {capacity:.0} NTD.\n\
Current holdings: {holdings}\n\n\
Reply with investment advice as JSON only:\n{schema}",
        capacity = input.user_capacity_ntd,
        holdings = holdings_json(input.holdings),
        schema = schema(input.user_capacity_ntd),
    )
}

fn full_prompt(input: &PromptInput<'_>) -> String {
    let capacity = input.user_capacity_ntd;
    [
        "You are a professional Taiwan stock market analyst.".to_string(),
        "The user follows a long-term, disciplined, staged investment strategy and is willing to buy or sell monthly.".to_string(),
        "Write marketOutlook and every reasoning field in Traditional Chinese.".to_string(),
        String::new(),
        "Principles:".to_string(),
        "1. Long-term value: prefer quality stocks and ETFs with durable growth.".to_string(),
        "2. Diversify across categories (TW ETFs, US stocks, bond ETFs).".to_string(),
        "3. Regular, disciplined investing.".to_string(),
        "4. Keep each position's amount close to a multiple of 5000 NTD.".to_string(),
        "5. Water level: scale the invested share of the budget to your market risk assessment.".to_string(),
        String::new(),
        "User:".to_string(),
        format!("- Maximum monthly investment: {capacity:.0} NTD"),
        format!("- Current holdings: {}", holdings_json(input.holdings)),
        format!("- Known stocks: {}", quotes_json(input.quotes)),
        String::new(),
        "Instructions:".to_string(),
        "1. Analyse the current Taiwan market in marketOutlook, including cycle, risk and likely turning points.".to_string(),
        format!("2. Decide decidedOptimalInvestmentNTD between 0 and {capacity:.0}; base every recommendation on it."),
        "3. Give BUY, SELL or HOLD for each current holding. HOLD uses shares 0. Never sell more shares than are held.".to_string(),
        "4. Suggest new stocks that are not already held.".to_string(),
        "5. Summarise the budget.".to_string(),
        String::new(),
        "Respond strictly in this JSON format with no text before or after it:".to_string(),
        schema(capacity),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::{StockCategory, StockQuote};

    fn quotes() -> QuoteBook {
        [StockQuote {
            symbol: "0050".to_string(),
            name: "元大台灣50".to_string(),
            category: StockCategory::TwEtf,
            current_price: 170.5,
        }]
        .into_iter()
        .collect()
    }

    #[test]
    fn full_prompt_lists_holdings_quotes_and_capacity() {
        let holdings = vec![Holding::new("0050", 12), Holding::new("0056", 0)];
        let quotes = quotes();
        let prompt = build_prompt(&PromptInput {
            model: "google/gemini-2.0-flash",
            user_capacity_ntd: 20000.0,
            holdings: &holdings,
            quotes: &quotes,
        });
        assert!(prompt.contains("20000 NTD"));
        assert!(prompt.contains("\"symbol\": \"0050\""));
        assert!(!prompt.contains("\"symbol\": \"0056\""));
        assert!(prompt.contains("元大台灣50"));
        assert!(prompt.contains("decidedOptimalInvestmentNTD"));
    }

    #[test]
    fn deepseek_models_get_compact_prompt() {
        let holdings = vec![Holding::new("0050", 12)];
        let quotes = quotes();
        let prompt = build_prompt(&PromptInput {
            model: "deepseek/deepseek-r1:free",
            user_capacity_ntd: 10000.0,
            holdings: &holdings,
            quotes: &quotes,
        });
        assert!(prompt.starts_with("You are a Taiwan stock market investment adviser"));
        assert!(!prompt.contains("Known stocks"));
    }
}
