//! Privacy-preserving AI insights for a wellness journaling app.
//!
//! `insight-rs` turns a user's recent diary, gratitude, and breathing
//! records into a short, localized evening reflection or morning impulse
//! produced by a chat-completions LLM. Personal data is scrubbed before it
//! leaves the process, per-user budgets cap API spend, and every failure
//! path degrades to locally generated fallback content instead of an error.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use insight_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ConfigError> {
//!     let config = InsightConfig::default().with_api_key("sk-...");
//!     let usage = Arc::new(InMemoryUsageStore::new(config.rate_limits.clone()));
//!     let client = BudgetedInsightClient::new(config, usage)?;
//!
//!     let pipeline = InsightPipeline::new(PromptConfig::new(Language::De), client);
//!
//!     let source = InMemoryDataSource::from_json_file("snapshot.json".as_ref())
//!         .unwrap_or_default();
//!     let response = pipeline
//!         .generate_insight(InsightKind::Evening, "user-1", &source)
//!         .await;
//!     println!("{}", response.content());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`aggregate`] | [`TimeWindowAggregator`](aggregate::TimeWindowAggregator), the [`DataSource`](aggregate::DataSource) seam, prompt-ready formatting |
//! | [`redact`] | Reversible PII scrubbing (`scrub` / `unscrub`) |
//! | [`prompt`] | Localized system/user prompt assembly and token budgeting |
//! | [`api`] | [`BudgetedInsightClient`](api::BudgetedInsightClient): rate limits, retry, failure classification, fallbacks |
//! | [`config`] | [`InsightConfig`](config::InsightConfig) and API key resolution |
//! | [`pipeline`] | [`InsightPipeline`](pipeline::InsightPipeline) wiring the stages together |
//! | [`records`] | Domain records read from storage |
//!
//! # Design principles
//!
//! 1. **Never fail the caller.** Data-source outages, API errors, and
//!    exhausted budgets all resolve to content the app can display. The only
//!    `Err` a caller sees is a configuration error at construction time.
//!
//! 2. **Personal data stays local.** Aggregated text is scrubbed before it is
//!    embedded in a prompt, and placeholders in the reply are restored on the
//!    way back.
//!
//! 3. **Spend is bounded.** Every request passes a per-user budget check
//!    before any network traffic happens.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod prelude;
pub mod prompt;
pub mod records;
pub mod redact;

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Marker appended to text cut down to a size limit.
pub const TRUNCATION_MARKER: &str = "...";

// ── Shared types ───────────────────────────────────────────────────

/// Output language for prompts, summaries, and fallback content.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    De,
    En,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::De => "de",
            Language::En => "en",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "de" | "german" | "deutsch" => Ok(Language::De),
            "en" | "english" => Ok(Language::En),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// Which insight to generate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// End-of-day reflection over the last 24 hours.
    Evening,
    /// Start-of-day impulse building on last evening's summary.
    Morning,
}

impl std::fmt::Display for InsightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightKind::Evening => write!(f, "evening"),
            InsightKind::Morning => write!(f, "morning"),
        }
    }
}

impl std::str::FromStr for InsightKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evening" => Ok(InsightKind::Evening),
            "morning" => Ok(InsightKind::Morning),
            other => Err(format!("unknown insight kind: {other}")),
        }
    }
}

// ── Text helpers ───────────────────────────────────────────────────

/// Cut `text` to at most `max_chars` characters and append
/// [`TRUNCATION_MARKER`]. Text already within the limit is returned as is.
///
/// Counts characters, not bytes, so multi-byte text is never split.
pub(crate) fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
