//! # Verdict Market
//!
//! The Reference Data Enricher: detects tree content that needs verifiable
//! market facts, extracts candidate ticker symbols, validates them against
//! a live quote API (cached), and injects real current/historical values
//! into the reasoning prompt so the model argues from data instead of
//! hallucinating it.
//!
//! Enrichment is strictly best-effort — no failure in this crate ever
//! fails an evaluation.

pub mod cache;
pub mod enrich;
pub mod finnhub;

pub use cache::ValidationCache;
pub use enrich::Enricher;
pub use finnhub::FinnhubClient;
