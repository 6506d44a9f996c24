//! Chat-completions wire types and the [`ChatBackend`] seam.
//!
//! [`HttpChatBackend`] talks to any OpenAI-compatible endpoint. Tests and
//! embedders can substitute their own backend.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{ConfigError, InsightConfig};

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Token usage statistics.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl UsageInfo {
    /// Total tokens, derived from the parts when the provider omits it.
    pub fn total(&self) -> u64 {
        match self.total_tokens {
            Some(total) => u64::from(total),
            None => {
                u64::from(self.prompt_tokens.unwrap_or(0))
                    + u64::from(self.completion_tokens.unwrap_or(0))
            }
        }
    }
}

/// Clean return type from [`ChatBackend::chat`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

// ── Errors ─────────────────────────────────────────────────────────

/// A failed chat round trip.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("empty response from API")]
    EmptyResponse,
}

// ── Backend seam ───────────────────────────────────────────────────

/// Boxed future returned by [`ChatBackend::chat`].
pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion, ApiError>> + Send + 'a>>;

/// One chat-completions round trip.
pub trait ChatBackend: Send + Sync {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

// ── HTTP backend ───────────────────────────────────────────────────

/// [`ChatBackend`] over an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpChatBackend {
    /// Build a backend from the resolved API key, base URL, and timeout in
    /// `config`.
    pub fn new(config: &InsightConfig) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?;
        let base_url = config.validated_base_url()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("insight-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(ConfigError::Client)?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, body: &ChatRequest) -> Result<ChatCompletion, ApiError> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;

        let status = resp.status();
        let text = resp.text().await.map_err(request_error)?;

        let elapsed = start.elapsed();
        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            elapsed.as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)?;

        if let Some(err) = parsed.error {
            return Err(ApiError::Api(err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or(ApiError::EmptyResponse)?;
        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(ApiError::EmptyResponse)?;
        debug!("LLM output: {} chars", content.chars().count());

        Ok(ChatCompletion {
            content,
            model: parsed.model,
            usage: parsed.usage,
            finish_reason: choice.finish_reason,
        })
    }
}

fn request_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        // Exact duration is owned by the client builder.
        ApiError::Timeout(Duration::ZERO)
    } else {
        ApiError::Request(e)
    }
}

impl ChatBackend for HttpChatBackend {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("sys"), Message::user("hi")],
            max_tokens: 300,
            temperature: 0.7,
        }
    }

    fn backend(server: &MockServer) -> HttpChatBackend {
        let config = InsightConfig::default()
            .with_api_key("test-key")
            .with_base_url(server.uri());
        HttpChatBackend::new(&config).unwrap()
    }

    #[test]
    fn request_serializes_openai_shape() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["max_tokens"], 300);
    }

    #[test]
    fn usage_total_falls_back_to_parts() {
        let usage = UsageInfo {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: None,
        };
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = InsightConfig::default()
            .with_api_key("k")
            .with_base_url("https://api.example.com/v1/");
        let backend = HttpChatBackend::new(&config).unwrap();
        assert_eq!(backend.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn parses_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini", "max_tokens": 300})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024",
                "choices": [{
                    "message": {"role": "assistant", "content": "• Gut gemacht"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = backend(&server).chat(&request()).await.unwrap();
        assert_eq!(completion.content, "• Gut gemacht");
        assert_eq!(completion.model.as_deref(), Some("gpt-4o-mini-2024"));
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.unwrap().total(), 30);
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend(&server).chat(&request()).await.unwrap_err();
        match &err {
            ApiError::Http { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected HTTP error, got {other:?}"),
        }
        assert_eq!(err.to_string(), "API HTTP 503: overloaded");
    }

    #[tokio::test]
    async fn error_body_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": {"message": "quota exhausted"}})),
            )
            .mount(&server)
            .await;

        let err = backend(&server).chat(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Api(ref m) if m == "quota exhausted"));
    }

    #[tokio::test]
    async fn missing_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = backend(&server).chat(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::EmptyResponse));
    }

    #[tokio::test]
    async fn garbage_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = backend(&server).chat(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }
}
