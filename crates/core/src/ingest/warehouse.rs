use crate::domain::portfolio::{Holding, QuoteBook, StockCategory, StockQuote};
use crate::ingest::types::HoldingRow;
use crate::ingest::PortfolioSource;
use crate::storage::{DocumentKey, DocumentStore};
use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Holdings from the `warehouse.md` document, priced against a reference universe.
#[derive(Clone)]
pub struct WarehousePortfolio {
    store: Arc<dyn DocumentStore>,
    universe: QuoteBook,
}

impl WarehousePortfolio {
    pub fn new(store: Arc<dyn DocumentStore>, universe: QuoteBook) -> Self {
        Self { store, universe }
    }

    async fn rows(&self) -> anyhow::Result<Vec<HoldingRow>> {
        let text = self
            .store
            .read(DocumentKey::Holdings)
            .await
            .context("failed to read holdings document")?;
        Ok(parse_warehouse(&text))
    }
}

#[async_trait::async_trait]
impl PortfolioSource for WarehousePortfolio {
    async fn load_holdings(&self) -> anyhow::Result<Vec<Holding>> {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for row in self.rows().await? {
            *merged.entry(row.symbol).or_default() += row.shares;
        }
        Ok(merged
            .into_iter()
            .map(|(symbol, shares)| Holding { symbol, shares })
            .collect())
    }

    async fn load_quotes(&self, symbols: &[String]) -> anyhow::Result<QuoteBook> {
        let rows = self.rows().await?;
        let mut book = QuoteBook::new();
        for symbol in symbols {
            let reference = self.universe.get(symbol);
            let row = rows.iter().find(|r| &r.symbol == symbol);

            let quote = match (reference, row) {
                (None, None) => continue,
                (Some(reference), None) => reference.clone(),
                (reference, Some(row)) => {
                    let Some(price) = row
                        .current_price
                        .or(reference.map(|q| q.current_price))
                    else {
                        continue;
                    };
                    StockQuote {
                        symbol: symbol.clone(),
                        name: row
                            .name
                            .clone()
                            .or_else(|| reference.map(|q| q.name.clone()))
                            .unwrap_or_else(|| symbol.clone()),
                        category: reference
                            .map(|q| q.category)
                            .unwrap_or(StockCategory::Unknown),
                        current_price: price,
                    }
                }
            };
            book.insert(quote);
        }
        Ok(book)
    }

    fn candidate_symbols(&self) -> Vec<String> {
        self.universe.iter().map(|q| q.symbol.clone()).collect()
    }
}

/// Tab-separated `symbol shares [name] [price] [change] [change%] [updated]`, or the legacy
/// whitespace-separated `symbol shares`. Lines without a positive share count are ignored.
pub fn parse_warehouse(text: &str) -> Vec<HoldingRow> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<HoldingRow> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let tabbed: Vec<&str> = line.split('\t').map(str::trim).collect();
    let parts: Vec<&str> = if tabbed.len() >= 2 {
        tabbed
    } else {
        line.split_whitespace().collect()
    };
    if parts.len() < 2 {
        return None;
    }

    let symbol = parts[0].to_string();
    let shares = parts[1].parse::<i64>().ok().filter(|n| *n > 0)? as u64;
    let text_at = |idx: usize| {
        parts
            .get(idx)
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
    };
    let number_at = |idx: usize| {
        parts
            .get(idx)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|n| n.is_finite())
    };

    Some(HoldingRow {
        symbol,
        shares,
        name: text_at(2),
        current_price: number_at(3).filter(|p| *p >= 0.0),
        change: number_at(4),
        change_percent: number_at(5),
        last_updated: text_at(6),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::universe::reference_quotes;
    use crate::storage::memory::MemoryDocumentStore;

    const WAREHOUSE: &str = "0050\t12\t元大台灣50\t180.25\t1.5\t0.84\t2026-10-18\n\
00878 300\n\
MYCO\t5\tMy Company\n\
0056\t0\n\
bad\tx\n\
\n";

    #[test]
    fn parses_tabbed_and_legacy_lines() {
        let rows = parse_warehouse(WAREHOUSE);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].symbol, "0050");
        assert_eq!(rows[0].shares, 12);
        assert_eq!(rows[0].current_price, Some(180.25));
        assert_eq!(rows[0].last_updated.as_deref(), Some("2026-10-18"));
        assert_eq!(rows[1].symbol, "00878");
        assert_eq!(rows[1].shares, 300);
        assert_eq!(rows[1].name, None);
        assert_eq!(rows[2].name.as_deref(), Some("My Company"));
        assert_eq!(rows[2].current_price, None);
    }

    fn portfolio() -> WarehousePortfolio {
        let store = Arc::new(
            MemoryDocumentStore::new().with_document(DocumentKey::Holdings, WAREHOUSE),
        );
        WarehousePortfolio::new(store, reference_quotes())
    }

    #[tokio::test]
    async fn loads_holdings_with_positive_shares() {
        let holdings = portfolio().load_holdings().await.unwrap();
        let symbols: Vec<_> = holdings.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["0050", "00878", "MYCO"]);
    }

    #[tokio::test]
    async fn quotes_prefer_document_prices_and_skip_unpriced_symbols() {
        let symbols: Vec<String> = ["0050", "00878", "MYCO", "NOPE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let quotes = portfolio().load_quotes(&symbols).await.unwrap();

        let q0050 = quotes.get("0050").unwrap();
        assert_eq!(q0050.current_price, 180.25);
        assert_eq!(q0050.category, StockCategory::TwEtf);

        // Reference price when the document has none.
        assert_eq!(quotes.get("00878").unwrap().current_price, 24.05);

        assert!(!quotes.contains("MYCO"));
        assert!(!quotes.contains("NOPE"));
    }
}
