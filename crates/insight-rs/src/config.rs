//! Client configuration and API key resolution.

use std::time::Duration;

use crate::api::{RateLimits, RetryConfig};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["INSIGHT_API_KEY", "OPENAI_API_KEY"];

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration errors. The only errors the crate surfaces to callers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no API key configured (set INSIGHT_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Settings for [`BudgetedInsightClient`](crate::api::BudgetedInsightClient).
#[derive(Debug, Clone)]
pub struct InsightConfig {
    /// Explicit API key. Takes precedence over the environment.
    pub api_key: Option<String>,
    /// Fall back to [`API_KEY_ENV_VARS`] when `api_key` is unset.
    pub env_fallback: bool,
    pub model: String,
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Maximum response tokens.
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub rate_limits: RateLimits,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            env_fallback: true,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 300,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl InsightConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Ignore environment variables when resolving the API key.
    pub fn without_env_fallback(mut self) -> Self {
        self.env_fallback = false;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limits(mut self, limits: RateLimits) -> Self {
        self.rate_limits = limits;
        self
    }

    /// The explicit key, else the first non-empty environment variable in
    /// [`API_KEY_ENV_VARS`]. Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let explicit = self.api_key.clone().filter(|k| !k.trim().is_empty());
        if explicit.is_some() || !self.env_fallback {
            return explicit;
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|k| !k.trim().is_empty())
    }

    pub fn require_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key().ok_or(ConfigError::MissingApiKey)
    }

    /// The base URL, checked to be an absolute http(s) URL.
    pub fn validated_base_url(&self) -> Result<&str, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(&self.base_url),
            other => Err(invalid(format!("unsupported scheme {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = InsightConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.rate_limits.max_calls_per_day, 20);
    }

    #[test]
    fn explicit_key_wins() {
        let config = InsightConfig::default().with_api_key("explicit");
        let key = config.resolve_api_key_with(env(&[("INSIGHT_API_KEY", "env")]));
        assert_eq!(key.as_deref(), Some("explicit"));
    }

    #[test]
    fn env_fallback_order_and_blank_values() {
        let config = InsightConfig::default().with_api_key("  ");
        let key = config.resolve_api_key_with(env(&[
            ("INSIGHT_API_KEY", ""),
            ("OPENAI_API_KEY", "sk-openai"),
        ]));
        assert_eq!(key.as_deref(), Some("sk-openai"));

        let key = config.resolve_api_key_with(env(&[
            ("INSIGHT_API_KEY", "sk-insight"),
            ("OPENAI_API_KEY", "sk-openai"),
        ]));
        assert_eq!(key.as_deref(), Some("sk-insight"));
    }

    #[test]
    fn env_fallback_can_be_disabled() {
        let config = InsightConfig::default().without_env_fallback();
        assert!(
            config
                .resolve_api_key_with(env(&[("OPENAI_API_KEY", "sk")]))
                .is_none()
        );
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn base_url_validation() {
        let ok = InsightConfig::default().with_base_url("http://localhost:8080/v1");
        assert!(ok.validated_base_url().is_ok());

        let relative = InsightConfig::default().with_base_url("api/v1");
        assert!(matches!(
            relative.validated_base_url(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let ftp = InsightConfig::default().with_base_url("ftp://example.com");
        assert!(ftp.validated_base_url().is_err());
    }
}
