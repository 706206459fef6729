//! Error taxonomy for the Verdict pipeline.
//!
//! One enum for the whole workspace. Parse ambiguity is deliberately NOT
//! represented here — an uninterpretable reasoning response fails closed to
//! a negative decision instead of erroring (see `verdict_engine::parser`).

use thiserror::Error;

/// All errors produced by Verdict crates.
#[derive(Error, Debug)]
pub enum VerdictError {
    /// No nodes exist for the requested tree id.
    #[error("Tree not found: {0}")]
    TreeNotFound(String),

    /// Nodes exist but the structure is unusable (missing required fields).
    #[error("Invalid tree structure: {0}")]
    InvalidTree(String),

    /// The reasoning capability failed: timeout, non-2xx, malformed payload.
    #[error("Reasoning provider error: {0}")]
    Provider(String),

    /// Reference data lookup failed. Never escalates past the enricher.
    #[error("Market data error: {0}")]
    Market(String),

    /// An action carried a type tag no handler is registered for.
    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    /// Persistence collaborator failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration load/parse/save failure.
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level HTTP failure (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Caller-supplied input rejected before any work began.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across all Verdict crates.
pub type Result<T> = std::result::Result<T, VerdictError>;
