//! Convenience re-exports for common `insight-rs` types.
//!
//! Meant to be glob-imported by applications wiring up the pipeline:
//!
//! ```ignore
//! use insight_rs::prelude::*;
//! ```
//!
//! Covers configuration, the data-source seam, the client with its usage
//! stores, and the redaction entry points. Wire types and the prompt
//! builders stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::config::{ConfigError, InsightConfig};
pub use crate::pipeline::InsightPipeline;
pub use crate::{InsightKind, Language};

// ── Aggregation ─────────────────────────────────────────────────────
pub use crate::aggregate::{
    Aggregation, DataRange, DataSource, EveningAggregation, InMemoryDataSource,
    MorningAggregation, SourceError, TimeWindowAggregator,
};
pub use crate::records::{BreathingRecord, DiaryRecord, GratitudeRecord, TimeOfDay};

// ── Prompts ─────────────────────────────────────────────────────────
pub use crate::prompt::{Prompt, PromptConfig};

// ── Client ──────────────────────────────────────────────────────────
pub use crate::api::{
    BudgetedInsightClient, FailureReason, FileUsageStore, InMemoryUsageStore, InsightRequest,
    InsightResponse, RateLimits, RetryConfig, UsageStatus, UsageStore,
};

// ── Redaction ───────────────────────────────────────────────────────
pub use crate::redact::{PiiCategory, RedactionMap, ScrubOptions, scrub, unscrub};
