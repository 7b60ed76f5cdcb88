use crate::domain::portfolio::{QuoteBook, StockCategory, StockQuote};

// NTD per USD used to express the US reference prices.
const USD_TWD: f64 = 32.5;

/// Reference universe offered to providers. Prices are snapshots for sizing, not live data.
pub fn reference_quotes() -> QuoteBook {
    use StockCategory::*;

    let rows: [(&str, &str, StockCategory, f64); 25] = [
        ("006208", "富邦台50", TwEtf, 100.50),
        ("00646", "元大S&P500", TwEtf, 60.30),
        ("00919", "群益台灣精選高息", TwEtf, 27.10),
        ("00878", "國泰永續高股息", TwEtf, 24.05),
        ("0056", "元大高股息", TwEtf, 40.20),
        ("00933B", "國泰10Y+金融債", BondEtf, 16.80),
        ("0050", "元大台灣50", TwEtf, 170.50),
        ("2330", "台積電", TwStock, 955.00),
        ("00929", "復華台灣科技優息", TwEtf, 21.15),
        ("00679B", "元大美債20年", BondEtf, 29.80),
        ("2603", "長榮", TwStock, 210.00),
        ("00940", "元大臺灣價值高息", TwEtf, 10.25),
        ("00713", "元大台灣高息低波", TwEtf, 58.50),
        ("AAPL", "Apple Inc.", UsStock, 190.00 * USD_TWD),
        ("GOOGL", "Alphabet Inc. (Google)", UsStock, 175.00 * USD_TWD),
        ("MSFT", "Microsoft Corp.", UsStock, 430.00 * USD_TWD),
        ("AMZN", "Amazon.com Inc.", UsStock, 185.00 * USD_TWD),
        ("00733", "富邦臺灣中小", TwEtf, 70.50),
        ("00858", "永豐美國500大", TwEtf, 30.80),
        ("00900", "富邦特選高股息30", TwEtf, 15.20),
        ("00910", "華南永昌台灣未來科技ETF", TwEtf, 18.30),
        ("00916", "國泰全球品牌50 ETF", TwEtf, 22.40),
        ("00921", "兆豐台灣產業龍頭存股等權重ETF", TwEtf, 19.10),
        ("00942B", "台新美A公司債20+", BondEtf, 15.50),
        ("00947", "台新臺灣IC設計動能ETF", TwEtf, 16.10),
    ];

    rows.into_iter()
        .map(|(symbol, name, category, current_price)| StockQuote {
            symbol: symbol.to_string(),
            name: name.to_string(),
            category,
            current_price,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_quotes_are_priced() {
        let quotes = reference_quotes();
        assert_eq!(quotes.len(), 25);
        assert!(quotes.iter().all(|q| q.current_price > 0.0));
        assert_eq!(quotes.get("AAPL").unwrap().category, StockCategory::UsStock);
    }
}
