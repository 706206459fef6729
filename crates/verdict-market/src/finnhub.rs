//! Finnhub market data client.
//!
//! Two endpoints cover everything the enricher needs: `/quote` for the
//! current price and `/stock/metric` for 52-week reference points (the
//! candle API needs a paid plan, so 52-week low serves as the historical
//! comparison price).

use async_trait::async_trait;
use serde_json::Value;
use verdict_core::config::MarketConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::MarketData;
use verdict_core::types::{Quote, SymbolMetrics};

/// HTTP client for the Finnhub REST API.
pub struct FinnhubClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl FinnhubClient {
    /// Create from the `[market]` config section.
    ///
    /// API key resolution: `config.api_key` > `FINNHUB_API_KEY` env var.
    pub fn from_config(config: &MarketConfig) -> Result<Self> {
        let api_key = if !config.api_key.is_empty() {
            config.api_key.clone()
        } else {
            std::env::var("FINNHUB_API_KEY").unwrap_or_default()
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VerdictError::Http(format!("Client build failed: {e}")))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json(&self, path: &str, query: &str, symbol: &str) -> Result<Value> {
        let url = format!(
            "{}{}?{}&token={}",
            self.base_url,
            path,
            query,
            self.api_key
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VerdictError::Market(format!("{symbol}: request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(VerdictError::Market(format!(
                "{symbol}: API error {}",
                resp.status()
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| VerdictError::Market(format!("{symbol}: malformed response: {e}")))?;

        if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
            return Err(VerdictError::Market(format!("{symbol}: {error}")));
        }
        Ok(json)
    }
}

#[async_trait]
impl MarketData for FinnhubClient {
    async fn quote(&self, symbol: &str) -> Result<Quote> {
        let json = self
            .get_json("/api/v1/quote", &format!("symbol={symbol}"), symbol)
            .await?;

        // Finnhub reports unknown symbols as an all-zero quote
        let price = json["c"].as_f64().unwrap_or(0.0);
        if price <= 0.0 {
            return Err(VerdictError::Market(format!("{symbol}: unknown symbol")));
        }

        Ok(Quote {
            price,
            previous_close: json["pc"].as_f64().unwrap_or(0.0),
        })
    }

    async fn metrics(&self, symbol: &str) -> Result<SymbolMetrics> {
        let json = self
            .get_json(
                "/api/v1/stock/metric",
                &format!("symbol={symbol}&metric=all"),
                symbol,
            )
            .await?;

        let metric = &json["metric"];
        if metric.is_null() {
            return Err(VerdictError::Market(format!("{symbol}: no metric data")));
        }

        let mut week52_low = metric["52WeekLow"].as_f64().unwrap_or(0.0);
        let week52_high = metric["52WeekHigh"].as_f64().unwrap_or(0.0);
        if week52_low <= 0.0 {
            week52_low = week52_high;
        }
        if week52_low <= 0.0 {
            return Err(VerdictError::Market(format!(
                "{symbol}: no historical price available"
            )));
        }

        Ok(SymbolMetrics {
            week52_low,
            week52_high,
            average_volume: metric["10DayAverageTradingVolume"].as_f64().unwrap_or(0.0) as u64,
            market_cap: metric["marketCapitalization"].as_f64().unwrap_or(0.0),
        })
    }
}
