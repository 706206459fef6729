//! # Verdict Providers
//!
//! Reasoning capability implementations. The default provider speaks the
//! OpenAI-compatible chat-completions protocol with Perplexity's web-search
//! extensions, which is what tree evaluation needs: answers grounded in
//! information from a bounded recency window.

pub mod sonar;

use verdict_core::config::VerdictConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::Reasoner;

pub use sonar::SonarProvider;

/// Create a reasoner from configuration.
///
/// Known names resolve to their default endpoint; a `custom:<url>` provider
/// string points the same client at any OpenAI-compatible server.
pub fn create_reasoner(config: &VerdictConfig) -> Result<Box<dyn Reasoner>> {
    let provider = config.llm.provider.as_str();
    match provider {
        "sonar" | "perplexity" => Ok(Box::new(SonarProvider::from_config(config)?)),
        other if other.starts_with("custom:") => {
            Ok(Box::new(SonarProvider::custom(other, config)?))
        }
        other => Err(VerdictError::Config(format!(
            "Unknown reasoning provider: {other}"
        ))),
    }
}
