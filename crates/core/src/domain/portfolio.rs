use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub shares: u64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, shares: u64) -> Self {
        Self {
            symbol: symbol.into(),
            shares,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCategory {
    #[serde(rename = "TW-ETF")]
    TwEtf,
    #[serde(rename = "TW-Stock")]
    TwStock,
    #[serde(rename = "US-Stock")]
    UsStock,
    #[serde(rename = "Bond-ETF")]
    BondEtf,
    Unknown,
}

impl StockCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockCategory::TwEtf => "TW-ETF",
            StockCategory::TwStock => "TW-Stock",
            StockCategory::UsStock => "US-Stock",
            StockCategory::BondEtf => "Bond-ETF",
            StockCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time price snapshot. Never assumed to be live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub symbol: String,
    pub name: String,
    pub category: StockCategory,
    pub current_price: f64,
}

/// Quotes keyed by symbol. Lookups that miss are the normalizer's "unknown symbol" case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteBook {
    quotes: BTreeMap<String, StockQuote>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later inserts for the same symbol replace earlier ones.
    pub fn insert(&mut self, quote: StockQuote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    pub fn get(&self, symbol: &str) -> Option<&StockQuote> {
        self.quotes.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.quotes.contains_key(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StockQuote> {
        self.quotes.values()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl FromIterator<StockQuote> for QuoteBook {
    fn from_iter<I: IntoIterator<Item = StockQuote>>(iter: I) -> Self {
        let mut book = QuoteBook::new();
        for quote in iter {
            book.insert(quote);
        }
        book
    }
}

/// Shares currently held for `symbol`, 0 when not held.
pub fn held_shares(holdings: &[Holding], symbol: &str) -> u64 {
    holdings
        .iter()
        .filter(|h| h.symbol == symbol)
        .map(|h| h.shares)
        .sum()
}
