use crate::domain::portfolio::{Holding, QuoteBook};

pub mod types;
pub mod universe;
pub mod warehouse;

/// Holdings and price snapshots. Output is treated as an opaque snapshot; prices may be
/// approximate or mocked.
#[async_trait::async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn load_holdings(&self) -> anyhow::Result<Vec<Holding>>;

    /// Quotes for the requested symbols. Symbols with no known price are simply absent.
    async fn load_quotes(&self, symbols: &[String]) -> anyhow::Result<QuoteBook>;

    /// Symbols offered to providers as candidates for new suggestions.
    fn candidate_symbols(&self) -> Vec<String> {
        Vec::new()
    }
}
