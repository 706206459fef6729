//! Prompt enrichment with verified market data.
//!
//! Detection is pure text heuristics; extraction adds a live validation
//! step so that all-caps noise ("CEO", "IPO") never triggers data fetches
//! for the reasoning prompt. Validation verdicts are cached per symbol in
//! an injected TTL cache.

use std::fmt::Write as _;
use std::sync::Arc;

use regex::Regex;
use verdict_core::error::Result;
use verdict_core::traits::MarketData;

use crate::cache::ValidationCache;

/// Keywords that flag content as plausibly market-related.
const MARKET_KEYWORDS: [&str; 6] = ["stock", "price", "ticker", "symbol", "market", "investment"];

/// Common all-caps words that are never treated as ticker symbols.
const STOPLIST: [&str; 42] = [
    "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HER", "WAS", "ONE", "OUR",
    "HAD", "WHAT", "SO", "UP", "OUT", "IF", "ABOUT", "WHO", "GET", "WHICH", "GO", "ME", "TO",
    "OF", "IN", "IT", "IS", "AT", "ON", "AS", "BE", "OR", "AN", "WE", "DO", "BY", "MY", "NO",
    "OK",
];

/// Reference data enricher. Owns its validation cache; holds the market
/// data capability behind a trait object so tests can inject a double.
pub struct Enricher {
    market: Option<Arc<dyn MarketData>>,
    cache: ValidationCache,
    symbol_pattern: Regex,
}

impl Enricher {
    /// Create an active enricher.
    pub fn new(market: Arc<dyn MarketData>, cache: ValidationCache) -> Self {
        Self {
            market: Some(market),
            cache,
            symbol_pattern: symbol_pattern(),
        }
    }

    /// Create a disabled enricher: detects nothing, enriches nothing.
    /// Used when `[market].enabled = false` or no API key is configured.
    pub fn disabled() -> Self {
        Self {
            market: None,
            cache: ValidationCache::new(std::time::Duration::from_secs(0), 1),
            symbol_pattern: symbol_pattern(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.market.is_some()
    }

    /// Does this tree content plausibly need verifiable external facts?
    /// Pure text heuristics — no network calls.
    pub fn detect(&self, tree_text: &str) -> bool {
        if self.market.is_none() {
            return false;
        }
        let lower = tree_text.to_lowercase();
        if MARKET_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return true;
        }
        self.candidate_tokens(tree_text).next().is_some()
    }

    /// Extract validated ticker symbols from tree content.
    ///
    /// Shape filter (2-5 uppercase letters) and stoplist run first; the
    /// survivors are checked against a live quote lookup, with verdicts
    /// cached per symbol for the cache TTL.
    pub async fn extract_identifiers(&self, tree_text: &str) -> Vec<String> {
        let market = match &self.market {
            Some(m) => m,
            None => return Vec::new(),
        };

        let mut seen = std::collections::HashSet::new();
        let mut validated = Vec::new();

        for token in self.candidate_tokens(tree_text) {
            if !seen.insert(token.to_string()) {
                continue;
            }

            let valid = match self.cache.get(token) {
                Some(cached) => cached,
                None => {
                    let verdict = market.quote(token).await.is_ok();
                    self.cache.insert(token, verdict);
                    tracing::debug!("Symbol {token} validation result: {verdict}");
                    verdict
                }
            };

            if valid {
                validated.push(token.to_string());
            }
        }

        validated
    }

    /// Append real market data for every validated symbol to `prompt`.
    ///
    /// Returns the (possibly unchanged) prompt and whether any real data
    /// made it in. Per-symbol fetch failures are annotated rather than
    /// dropped; a total failure degrades to the original prompt. This
    /// function cannot fail the evaluation.
    pub async fn enrich(&self, prompt: &str, tree_text: &str, comparison_days: u32) -> (String, bool) {
        let market = match &self.market {
            Some(m) => m,
            None => return (prompt.to_string(), false),
        };

        let symbols = self.extract_identifiers(tree_text).await;
        if symbols.is_empty() {
            tracing::debug!("No validated symbols extracted, using original prompt");
            return (prompt.to_string(), false);
        }

        let mut block = String::from("\n\n=== REAL MARKET DATA ===\n");
        let mut any_data = false;

        for symbol in &symbols {
            match fetch_symbol_block(market.as_ref(), symbol).await {
                Ok(section) => {
                    block.push_str(&section);
                    any_data = true;
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to fetch data for symbol {symbol}: {e}");
                    let _ = writeln!(block, "{symbol}: data unavailable");
                }
            }
        }

        if !any_data {
            tracing::warn!(
                "⚠️ Enrichment degraded: no market data available for {} symbol(s)",
                symbols.len()
            );
            return (prompt.to_string(), false);
        }

        block.push_str("=== END REAL DATA ===\n");
        block.push_str("Use the above REAL data (not web search) for your analysis.\n\n");

        tracing::info!(
            "📈 Enriched prompt with {} symbol(s) over a {comparison_days}-day window",
            symbols.len()
        );
        (format!("{prompt}{block}"), true)
    }

    fn candidate_tokens<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> {
        self.symbol_pattern
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|token| !STOPLIST.contains(token))
    }
}

fn symbol_pattern() -> Regex {
    // 2-5 uppercase letters on word boundaries
    Regex::new(r"\b[A-Z]{2,5}\b").expect("literal pattern")
}

/// Format one symbol's current + historical data section.
async fn fetch_symbol_block(market: &dyn MarketData, symbol: &str) -> Result<String> {
    let quote = market.quote(symbol).await?;
    let metrics = market.metrics(symbol).await?;

    let change = quote.price - metrics.week52_low;
    let percent = (change / metrics.week52_low) * 100.0;

    let mut section = String::new();
    let _ = writeln!(section, "{symbol}:");
    let _ = writeln!(section, "- Current Price: ${:.2}", quote.price);
    let _ = writeln!(section, "- 52-Week Low: ${:.2}", metrics.week52_low);
    let _ = writeln!(
        section,
        "- Change from 52W Low: ${change:.2} ({percent:.2}%)"
    );
    let _ = writeln!(section, "- Average Volume: {}", metrics.average_volume);
    let _ = writeln!(section, "- Market Cap: ${:.2}M", metrics.market_cap);
    section.push('\n');
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use verdict_core::error::VerdictError;
    use verdict_core::types::{Quote, SymbolMetrics};

    /// Market double: "AAPL" and "MSFT" exist, everything else is unknown.
    struct FakeMarket {
        quote_calls: AtomicUsize,
    }

    impl FakeMarket {
        fn new() -> Self {
            Self {
                quote_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketData for FakeMarket {
        async fn quote(&self, symbol: &str) -> verdict_core::error::Result<Quote> {
            self.quote_calls.fetch_add(1, Ordering::SeqCst);
            match symbol {
                "AAPL" | "MSFT" => Ok(Quote {
                    price: 200.0,
                    previous_close: 198.0,
                }),
                _ => Err(VerdictError::Market(format!("{symbol}: unknown symbol"))),
            }
        }

        async fn metrics(&self, symbol: &str) -> verdict_core::error::Result<SymbolMetrics> {
            match symbol {
                "AAPL" => Ok(SymbolMetrics {
                    week52_low: 150.0,
                    week52_high: 240.0,
                    average_volume: 54,
                    market_cap: 3_000_000.0,
                }),
                _ => Err(VerdictError::Market(format!("{symbol}: no metric data"))),
            }
        }
    }

    fn enricher(market: Arc<FakeMarket>) -> Enricher {
        Enricher::new(market, ValidationCache::new(Duration::from_secs(60), 16))
    }

    #[test]
    fn test_detect_keywords_and_shape() {
        let e = enricher(Arc::new(FakeMarket::new()));
        assert!(e.detect("is the stock trending up?"));
        assert!(e.detect("compare AAPL against last week"));
        assert!(!e.detect("is it raining in paris today?"));
    }

    #[test]
    fn test_disabled_detects_nothing() {
        let e = Enricher::disabled();
        assert!(!e.detect("buy AAPL stock now"));
    }

    #[tokio::test]
    async fn test_stoplist_never_extracted() {
        let e = enricher(Arc::new(FakeMarket::new()));
        let symbols = e
            .extract_identifiers("THE plan: AND we hold IF NOT falling")
            .await;
        assert!(symbols.is_empty());
    }

    #[tokio::test]
    async fn test_extraction_validates_against_lookup() {
        let e = enricher(Arc::new(FakeMarket::new()));
        let symbols = e.extract_identifiers("weigh AAPL against FAKE and MSFT").await;
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_validation_cache_bounds_lookups() {
        let market = Arc::new(FakeMarket::new());
        let e = enricher(market.clone());

        e.extract_identifiers("AAPL here").await;
        e.extract_identifiers("AAPL again").await;
        e.extract_identifiers("AAPL a third time").await;

        assert_eq!(market.quote_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enrich_appends_block_and_annotates_failures() {
        let e = enricher(Arc::new(FakeMarket::new()));
        // MSFT validates (quote ok) but has no metrics: annotated, not dropped
        let (prompt, enriched) = e
            .enrich("Evaluate the tree.", "hold AAPL or MSFT?", 7)
            .await;
        assert!(enriched);
        assert!(prompt.starts_with("Evaluate the tree."));
        assert!(prompt.contains("=== REAL MARKET DATA ==="));
        assert!(prompt.contains("- Current Price: $200.00"));
        assert!(prompt.contains("MSFT: data unavailable"));
    }

    #[tokio::test]
    async fn test_enrich_degrades_to_original_prompt() {
        let e = enricher(Arc::new(FakeMarket::new()));
        let (prompt, enriched) = e.enrich("Evaluate.", "nothing relevant here", 7).await;
        assert_eq!(prompt, "Evaluate.");
        assert!(!enriched);
    }
}
