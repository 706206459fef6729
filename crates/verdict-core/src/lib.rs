//! # Verdict Core
//!
//! Shared foundation for the Verdict evaluation pipeline: the data model
//! (schedules, tree nodes, audit entries, actions), the error taxonomy,
//! configuration, and the traits every external collaborator is injected
//! behind (persistence stores, the reasoning capability, market data).
//!
//! Nothing in this crate performs I/O beyond reading/writing the config
//! file — implementations live in `verdict-store`, `verdict-providers`,
//! and `verdict-market`.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::VerdictConfig;
pub use error::{Result, VerdictError};
pub use types::{
    Action, AuditLogEntry, EvaluationResult, Quote, Schedule, ScheduleStatus, SymbolMetrics,
    TreeNode,
};
