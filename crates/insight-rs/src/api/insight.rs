//! [`BudgetedInsightClient`]: budget check, bounded request, retry, and
//! fallback synthesis.
//!
//! Per request the client moves through
//! `CHECK_BUDGET → SEND → (RETRY)* → SUCCESS | FALLBACK`. It never returns
//! an error: every failure resolves to an [`InsightResponse::Fallback`]
//! tagged with a [`FailureReason`].

use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::client::{ApiError, ChatBackend, ChatRequest, HttpChatBackend, Message, UsageInfo};
use super::fallback::fallback_content;
use super::retry::{FailureReason, classify_error};
use super::usage::{UsageStatus, UsageStore};
use crate::Language;
use crate::config::{ConfigError, InsightConfig};
use crate::prompt::Prompt;

/// One insight generation request.
#[derive(Debug, Clone)]
pub struct InsightRequest {
    pub prompt: Prompt,
    pub user_id: String,
}

impl InsightRequest {
    pub fn new(prompt: Prompt, user_id: impl Into<String>) -> Self {
        Self {
            prompt,
            user_id: user_id.into(),
        }
    }
}

/// A model-generated insight.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    pub usage: UsageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Locally synthesized substitute content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FallbackResponse {
    pub content: String,
    pub reason: FailureReason,
}

/// Outcome of [`BudgetedInsightClient::send_request`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InsightResponse {
    Completion(AiResponse),
    Fallback(FallbackResponse),
}

impl InsightResponse {
    pub fn content(&self) -> &str {
        match self {
            InsightResponse::Completion(r) => &r.content,
            InsightResponse::Fallback(r) => &r.content,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, InsightResponse::Fallback(_))
    }

    /// Failure reason for fallbacks, `None` for completions.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            InsightResponse::Completion(_) => None,
            InsightResponse::Fallback(r) => Some(r.reason),
        }
    }
}

/// Chat client with per-user budgets, retries, and fallbacks.
pub struct BudgetedInsightClient {
    config: InsightConfig,
    backend: Arc<dyn ChatBackend>,
    usage: Arc<dyn UsageStore>,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for BudgetedInsightClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetedInsightClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl BudgetedInsightClient {
    /// Create a client over the HTTP backend described by `config`.
    ///
    /// Fails if no API key can be resolved or the base URL is invalid.
    pub fn new(config: InsightConfig, usage: Arc<dyn UsageStore>) -> Result<Self, ConfigError> {
        let backend = HttpChatBackend::new(&config)?;
        Ok(Self::from_parts(config, Arc::new(backend), usage))
    }

    /// Create a client over a custom backend. An API key is still required.
    pub fn with_backend(
        config: InsightConfig,
        backend: Arc<dyn ChatBackend>,
        usage: Arc<dyn UsageStore>,
    ) -> Result<Self, ConfigError> {
        config.require_api_key()?;
        Ok(Self::from_parts(config, backend, usage))
    }

    fn from_parts(
        config: InsightConfig,
        backend: Arc<dyn ChatBackend>,
        usage: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            config,
            backend,
            usage,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Seed the random source used for fallback selection.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    /// Send one insight request.
    ///
    /// Requests over budget return a `rate_limit` fallback without any
    /// network traffic. Server errors are retried up to
    /// [`RetryConfig::max_retries`](super::RetryConfig::max_retries) times;
    /// exhausting them reports `timeout`. Every other failure is returned
    /// immediately with its classified reason.
    pub async fn send_request(&self, request: &InsightRequest) -> InsightResponse {
        let user_id = request.user_id.as_str();
        let language = request.prompt.language;
        let estimated = u64::try_from(request.prompt.estimated_token_count).unwrap_or(u64::MAX);

        let status = self.usage.status(user_id).await;
        if let Some(limit) = self.config.rate_limits.exceeded_by(&status, estimated) {
            info!(
                "Budget check rejected request for {user_id}: {limit} (calls_today={}, tokens_today={}, calls_last_minute={})",
                status.calls_today, status.tokens_today, status.calls_last_minute
            );
            return self.fallback(language, FailureReason::RateLimit);
        }

        let chat = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(&request.prompt.system_prompt),
                Message::user(&request.prompt.user_prompt),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let max_attempts = self.config.retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Insight request for {user_id}: attempt {attempt}/{max_attempts}");

            let result = match tokio::time::timeout(self.config.timeout, self.backend.chat(&chat))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(self.config.timeout)),
            };

            let error = match result {
                Ok(completion) => {
                    let tokens = completion.usage.as_ref().map_or(estimated, UsageInfo::total);
                    self.usage.increment_usage(user_id, tokens).await;
                    debug!("Insight for {user_id} completed: {tokens} tokens recorded");
                    return InsightResponse::Completion(AiResponse {
                        content: completion.content,
                        model: completion.model.unwrap_or_else(|| chat.model.clone()),
                        usage: completion.usage.unwrap_or_default(),
                        finish_reason: completion.finish_reason,
                        attempts: attempt,
                    });
                }
                Err(e) => e,
            };

            let reason = classify_error(&error);
            if !reason.is_retryable() {
                warn!("Insight request failed ({reason}): {error}");
                return self.fallback(language, reason);
            }
            if attempt >= max_attempts {
                warn!("Retries exhausted after {attempt} attempt(s): {error}");
                return self.fallback(language, FailureReason::Timeout);
            }

            let delay = self.config.retry.delay_for_attempt(attempt - 1);
            warn!(
                "Attempt {attempt}/{max_attempts} failed ({reason}): {error}; retrying in {:.2}s",
                delay.as_secs_f64()
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    pub async fn rate_limit_status(&self, user_id: &str) -> UsageStatus {
        self.usage.status(user_id).await
    }

    pub async fn reset_daily_limits(&self) {
        self.usage.reset_daily_limits().await;
    }

    fn fallback(&self, language: Language, reason: FailureReason) -> InsightResponse {
        let content = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            fallback_content(language, &mut *rng)
        };
        InsightResponse::Fallback(FallbackResponse { content, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{ChatCompletion, ChatFuture};
    use crate::api::retry::RetryConfig;
    use crate::api::usage::{InMemoryUsageStore, RateLimits};
    use crate::prompt::build_fallback_prompt;
    use crate::{InsightKind, Language};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    type Script = Box<dyn Fn(u32) -> Result<ChatCompletion, ApiError> + Send + Sync>;

    /// Backend that answers attempt `n` (1-based) with `script(n)`.
    struct ScriptedBackend {
        calls: AtomicU32,
        script: Script,
    }

    impl ScriptedBackend {
        fn new(
            script: impl Fn(u32) -> Result<ChatCompletion, ApiError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                script: Box::new(script),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result = (self.script)(n);
            Box::pin(async move { result })
        }
    }

    struct SlowBackend;

    impl ChatBackend for SlowBackend {
        fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Err(ApiError::EmptyResponse)
            })
        }
    }

    fn ok(content: &str, total: u32) -> Result<ChatCompletion, ApiError> {
        Ok(ChatCompletion {
            content: content.into(),
            model: Some("test-model".into()),
            usage: Some(UsageInfo {
                prompt_tokens: Some(total / 2),
                completion_tokens: Some(total - total / 2),
                total_tokens: Some(total),
            }),
            finish_reason: Some("stop".into()),
        })
    }

    fn http(status: u16) -> Result<ChatCompletion, ApiError> {
        Err(ApiError::Http {
            status,
            body: "error".into(),
        })
    }

    fn config() -> InsightConfig {
        InsightConfig::default()
            .with_api_key("test-key")
            .with_retry(RetryConfig::immediate(3))
    }

    fn request(user: &str) -> InsightRequest {
        InsightRequest::new(build_fallback_prompt(InsightKind::Evening, Language::De), user)
    }

    fn build_client(
        config: InsightConfig,
        backend: Arc<dyn ChatBackend>,
    ) -> (BudgetedInsightClient, Arc<InMemoryUsageStore>) {
        let store = Arc::new(InMemoryUsageStore::new(config.rate_limits.clone()));
        let client = BudgetedInsightClient::with_backend(config, backend, store.clone())
            .unwrap()
            .with_rng_seed(42);
        (client, store)
    }

    #[test]
    fn construction_requires_api_key() {
        let store = Arc::new(InMemoryUsageStore::default());
        let config = InsightConfig::default().without_env_fallback();
        let err = BudgetedInsightClient::new(config.clone(), store.clone()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));

        let backend = ScriptedBackend::new(|_| ok("x", 1));
        let err = BudgetedInsightClient::with_backend(config, backend, store).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[tokio::test]
    async fn success_records_usage() {
        let backend = ScriptedBackend::new(|_| ok("• Schöner Tag", 120));
        let (client, store) = build_client(config(), backend.clone());

        let response = client.send_request(&request("u1")).await;
        match response {
            InsightResponse::Completion(ref r) => {
                assert_eq!(r.content, "• Schöner Tag");
                assert_eq!(r.model, "test-model");
                assert_eq!(r.attempts, 1);
            }
            ref other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(backend.calls(), 1);

        let status = store.status("u1").await;
        assert_eq!(status.calls_today, 1);
        assert_eq!(status.tokens_today, 120);
        assert_eq!(client.rate_limit_status("u1").await, status);
    }

    #[tokio::test]
    async fn daily_call_limit_short_circuits() {
        let backend = ScriptedBackend::new(|_| ok("unused", 1));
        let limits = RateLimits {
            max_calls_per_day: 2,
            max_tokens_per_day: 1_000_000,
            max_calls_per_minute: 100,
        };
        let (client, store) = build_client(config().with_rate_limits(limits), backend.clone());
        store.increment_usage("u1", 1).await;
        store.increment_usage("u1", 1).await;

        let response = client.send_request(&request("u1")).await;
        assert_eq!(response.reason(), Some(FailureReason::RateLimit));
        assert!(response.content().contains("Atemempfehlung:"));
        assert_eq!(backend.calls(), 0);

        // Other users are unaffected.
        assert!(!client.send_request(&request("u2")).await.is_fallback());
    }

    #[tokio::test]
    async fn token_budget_counts_the_prompt_estimate() {
        let backend = ScriptedBackend::new(|_| ok("unused", 1));
        let prompt_tokens =
            build_fallback_prompt(InsightKind::Evening, Language::De).estimated_token_count;
        let limits = RateLimits {
            max_calls_per_day: 100,
            max_tokens_per_day: 1000 + prompt_tokens as u64 - 1,
            max_calls_per_minute: 100,
        };
        let (client, store) = build_client(config().with_rate_limits(limits), backend.clone());
        store.increment_usage("u1", 1000).await;

        let response = client.send_request(&request("u1")).await;
        assert_eq!(response.reason(), Some(FailureReason::RateLimit));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn per_minute_limit_short_circuits() {
        let backend = ScriptedBackend::new(|_| ok("fine", 10));
        let limits = RateLimits {
            max_calls_per_day: 100,
            max_tokens_per_day: 1_000_000,
            max_calls_per_minute: 2,
        };
        let (client, _store) = build_client(config().with_rate_limits(limits), backend.clone());

        assert!(!client.send_request(&request("u1")).await.is_fallback());
        assert!(!client.send_request(&request("u1")).await.is_fallback());
        let third = client.send_request(&request("u1")).await;
        assert_eq!(third.reason(), Some(FailureReason::RateLimit));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn server_errors_retry_then_report_timeout() {
        let backend = ScriptedBackend::new(|_| http(500));
        let (client, store) = build_client(config(), backend.clone());

        let response = client.send_request(&request("u1")).await;
        assert_eq!(response.reason(), Some(FailureReason::Timeout));
        assert_eq!(backend.calls(), 4);
        assert_eq!(store.status("u1").await.calls_today, 0);
    }

    #[tokio::test]
    async fn server_error_then_success() {
        let backend = ScriptedBackend::new(|n| if n < 3 { http(502) } else { ok("ok", 5) });
        let (client, _store) = build_client(config(), backend.clone());

        match client.send_request(&request("u1")).await {
            InsightResponse::Completion(r) => assert_eq!(r.attempts, 3),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_fast() {
        for (status, reason) in [
            (400, FailureReason::InvalidRequest),
            (429, FailureReason::RateLimit),
            (404, FailureReason::Unknown),
        ] {
            let backend = ScriptedBackend::new(move |_| http(status));
            let (client, _store) = build_client(config(), backend.clone());

            let response = client.send_request(&request("u1")).await;
            assert_eq!(response.reason(), Some(reason), "status {status}");
            assert_eq!(backend.calls(), 1, "status {status}");
        }
    }

    #[tokio::test]
    async fn quota_message_is_classified() {
        let backend =
            ScriptedBackend::new(|_| Err(ApiError::Api("You exceeded your current quota".into())));
        let (client, _store) = build_client(config(), backend.clone());

        let response = client.send_request(&request("u1")).await;
        assert_eq!(response.reason(), Some(FailureReason::QuotaExceeded));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let config = config().with_timeout(Duration::from_millis(50));
        let (client, _store) = build_client(config, Arc::new(SlowBackend));

        let response = client.send_request(&request("u1")).await;
        assert_eq!(response.reason(), Some(FailureReason::Timeout));
    }

    #[tokio::test]
    async fn fallback_uses_prompt_language() {
        let backend = ScriptedBackend::new(|_| http(400));
        let (client, _store) = build_client(config(), backend);

        let prompt = build_fallback_prompt(InsightKind::Morning, Language::En);
        let response = client.send_request(&InsightRequest::new(prompt, "u1")).await;
        assert!(response.content().contains("Breathing recommendation:"));
    }

    #[tokio::test]
    async fn reset_clears_daily_counters() {
        let backend = ScriptedBackend::new(|_| ok("ok", 10));
        let (client, _store) = build_client(config(), backend);
        client.send_request(&request("u1")).await;
        assert_eq!(client.rate_limit_status("u1").await.calls_today, 1);

        client.reset_daily_limits().await;
        assert_eq!(client.rate_limit_status("u1").await.calls_today, 0);
    }

    #[test]
    fn response_serializes_with_type_tag() {
        let response = InsightResponse::Fallback(FallbackResponse {
            content: "x".into(),
            reason: FailureReason::ServerError,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "fallback");
        assert_eq!(value["reason"], "server_error");
    }
}
