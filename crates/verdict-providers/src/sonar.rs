//! OpenAI-compatible chat-completions client with web-search recency
//! options.
//!
//! One struct covers the Perplexity Sonar API and any custom endpoint that
//! speaks the same protocol; they differ only in base URL and API key.
//! Evaluations always run at temperature 0.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use verdict_core::config::VerdictConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::Reasoner;

const SONAR_BASE_URL: &str = "https://api.perplexity.ai";

/// Reasoning provider for Perplexity-style chat-completions APIs.
pub struct SonarProvider {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl SonarProvider {
    /// Create from configuration.
    ///
    /// Resolution order: API key `config.llm.api_key` > `PERPLEXITY_API_KEY`
    /// env var; base URL `config.llm.endpoint` > provider default.
    pub fn from_config(config: &VerdictConfig) -> Result<Self> {
        let api_key = if !config.llm.api_key.is_empty() {
            config.llm.api_key.clone()
        } else {
            std::env::var("PERPLEXITY_API_KEY").unwrap_or_default()
        };

        let base_url = if !config.llm.endpoint.is_empty() {
            config.llm.endpoint.trim_end_matches('/').to_string()
        } else {
            SONAR_BASE_URL.to_string()
        };

        Self::build("sonar", api_key, base_url, config)
    }

    /// Create for a custom endpoint ("custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, config: &VerdictConfig) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = if !config.llm.api_key.is_empty() {
            config.llm.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        Self::build("custom", api_key, base_url, config)
    }

    fn build(name: &str, api_key: String, base_url: String, config: &VerdictConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(
                config.llm.connect_timeout_secs,
            ))
            .timeout(std::time::Duration::from_secs(config.llm.timeout_secs))
            .build()
            .map_err(|e| VerdictError::Http(format!("Client build failed: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            api_key,
            base_url,
            model: config.llm.model.clone(),
            client,
        })
    }

    /// POST the request body and extract `choices[0].message.content`.
    async fn send(&self, body: Value) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(VerdictError::Config(format!(
                "No API key configured for provider '{}'",
                self.name
            )));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                VerdictError::Provider(format!("{} connection failed ({}): {}", self.name, url, e))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(VerdictError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| VerdictError::Provider(format!("Malformed response: {e}")))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| VerdictError::Provider("No choices in response".into()))?;

        tracing::debug!("🧠 {} returned {} chars", self.name, content.len());
        Ok(content.to_string())
    }

    fn base_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        })
    }
}

#[async_trait]
impl Reasoner for SonarProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.send(self.base_body(system, user)).await
    }

    async fn complete_recent(&self, system: &str, user: &str, recency_days: u32) -> Result<String> {
        let mut body = self.base_body(system, user);

        // Bound the web search to the comparison window: high context,
        // fresh results only, and nothing older than the window start.
        let after = Utc::now().date_naive() - chrono::Days::new(recency_days as u64);
        body["web_search_options"] = json!({
            "search_context_size": "high",
            "search_recency_filter": "day",
            "search_after_date_filter": after.format("%Y-%m-%d").to_string(),
        });

        tracing::debug!(
            "🔎 Search-scoped completion: after {} ({recency_days} days back)",
            after
        );
        self.send(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> VerdictConfig {
        let mut config = VerdictConfig::default();
        config.llm.api_key = "test-key".into();
        config
    }

    #[test]
    fn test_custom_endpoint_parsing() {
        let provider =
            SonarProvider::custom("custom:https://llm.internal/v1/", &config_with_key()).unwrap();
        assert_eq!(provider.base_url, "https://llm.internal/v1");
        assert_eq!(provider.name(), "custom");
    }

    #[test]
    fn test_default_base_url() {
        let provider = SonarProvider::from_config(&config_with_key()).unwrap();
        assert_eq!(provider.base_url, SONAR_BASE_URL);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let provider = SonarProvider {
            name: "sonar".into(),
            api_key: String::new(),
            base_url: "http://127.0.0.1:1".into(),
            model: "sonar".into(),
            client: reqwest::Client::new(),
        };
        let err = provider.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, VerdictError::Config(_)));
    }

    #[test]
    fn test_body_shape() {
        let provider = SonarProvider::from_config(&config_with_key()).unwrap();
        let body = provider.base_body("sys", "usr");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
    }
}
