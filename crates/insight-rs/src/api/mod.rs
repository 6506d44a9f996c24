//! API interaction layer: chat backend, budgets, retry, and fallbacks.
//!
//! - [`client`]: chat-completions wire types, the [`ChatBackend`] seam, and
//!   the reqwest-based [`HttpChatBackend`].
//! - [`usage`]: per-user daily and per-minute counters behind the
//!   [`UsageStore`] trait, with in-memory and JSON-file implementations.
//! - [`retry`]: exponential backoff and classification of failures into
//!   [`FailureReason`]s. Only server errors are retried.
//! - [`fallback`]: localized substitute content for failed requests.
//! - [`insight`]: [`BudgetedInsightClient`], which ties the above together.

pub mod client;
pub mod fallback;
pub mod insight;
pub mod retry;
pub mod usage;

// Re-export commonly used items at the module level.
pub use client::{
    ApiError, ChatBackend, ChatCompletion, ChatFuture, ChatRequest, HttpChatBackend, Message,
    UsageInfo,
};
pub use insight::{
    AiResponse, BudgetedInsightClient, FallbackResponse, InsightRequest, InsightResponse,
};
pub use retry::{FailureReason, RetryConfig, classify_error};
pub use usage::{
    FileUsageStore, InMemoryUsageStore, RateLimits, UsageFuture, UsageStatus, UsageStore,
    UsageStoreError,
};
