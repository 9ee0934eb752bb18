//! OpenAI chat-completions provider
//!
//! Works against any OpenAI-compatible endpoint via [`OpenAiProvider::with_base_url`].

use crate::{
    error::ProviderError,
    retry::{with_retry, RetryConfig},
    r#trait::{FinishReason, ModelInfo, Provider, ProviderMetadata, ProviderResponse, TokenUsage},
    Message, MessageRole,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// OpenAI provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model_info: ModelInfo,
    metadata: ProviderMetadata,
    max_tokens: u32,
    base_url: String,
    retry: RetryConfig,
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model_id = model.into();

        Self {
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            api_key: api_key.into(),
            model_info: Self::get_model_info(&model_id),
            metadata: Self::create_metadata(DEFAULT_API_URL),
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: DEFAULT_API_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Point at an OpenAI-compatible endpoint.
    ///
    /// Accepts either the full chat-completions URL or an API root such as
    /// `http://localhost:11434/v1`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let trimmed = base_url.trim_end_matches('/');
        self.base_url = if trimmed.ends_with("/chat/completions") {
            trimmed.to_string()
        } else {
            format!("{}/chat/completions", trimmed)
        };
        self.metadata.base_url = Some(self.base_url.clone());
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn create_metadata(base_url: &str) -> ProviderMetadata {
        ProviderMetadata {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            default_model: "gpt-4o".to_string(),
            base_url: Some(base_url.to_string()),
        }
    }

    fn get_model_info(model_id: &str) -> ModelInfo {
        let (context_window, max_output_tokens) = match model_id {
            "gpt-4o" | "gpt-4o-mini" => (128000, 16384),
            "gpt-4-turbo" | "gpt-4-turbo-preview" => (128000, 4096),
            "gpt-3.5-turbo" => (16385, 4096),
            "o1" | "o1-mini" => (128000, 32768),
            _ => (128000, 4096),
        };

        ModelInfo {
            context_window,
            max_output_tokens,
            ..ModelInfo::new(model_id, "openai")
        }
    }

    fn build_request(&self, messages: &[Message], system_prompt: Option<&str>) -> OpenAiRequest {
        let mut api_messages = Vec::with_capacity(messages.len() + 1);

        if let Some(system) = system_prompt {
            api_messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.to_string()),
            });
        }

        api_messages.extend(messages.iter().map(OpenAiMessage::from));

        OpenAiRequest {
            model: self.model_info.id.clone(),
            messages: api_messages,
            max_tokens: Some(self.max_tokens),
        }
    }

    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> ProviderError {
        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            let message = error_response.error.message;

            return match error_response.error.code.as_deref() {
                Some("rate_limit_exceeded") => ProviderError::RateLimited {
                    retry_after_ms: None,
                },
                Some("context_length_exceeded") => ProviderError::ContextLengthExceeded(message),
                Some("invalid_api_key") => ProviderError::Authentication(message),
                Some("insufficient_quota") => ProviderError::QuotaExceeded(message),
                Some("model_not_found") => ProviderError::ModelNotFound(message),
                _ => ProviderError::from_http_status(status.as_u16(), &message),
            };
        }

        ProviderError::from_http_status(status.as_u16(), body)
    }

    async fn send_once(&self, request: &OpenAiRequest) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        api_response.into_provider_response(&self.model_info.id)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn model(&self) -> &ModelInfo {
        &self.model_info
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        system_prompt: Option<String>,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.is_available() {
            return Err(ProviderError::NotConfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let request = self.build_request(&messages, system_prompt.as_deref());
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );

        with_retry(&self.retry, "openai_complete", || self.send_once(&request)).await
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        OpenAiMessage {
            role: msg.role.as_str().to_string(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

impl OpenAiResponse {
    fn into_provider_response(self, model: &str) -> Result<ProviderResponse, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Other,
        };

        let usage = self
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            finish_reason,
            model: model.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info() {
        let info = OpenAiProvider::get_model_info("gpt-4o");
        assert_eq!(info.id, "gpt-4o");
        assert_eq!(info.provider, "openai");
        assert_eq!(info.max_output_tokens, 16384);
    }

    #[test]
    fn test_base_url_normalisation() {
        let p = OpenAiProvider::new("k", "gpt-4o").with_base_url("http://localhost:11434/v1/");
        assert_eq!(p.base_url(), "http://localhost:11434/v1/chat/completions");

        let p = OpenAiProvider::new("k", "gpt-4o")
            .with_base_url("https://example.test/v1/chat/completions");
        assert_eq!(p.base_url(), "https://example.test/v1/chat/completions");
    }

    #[test]
    fn test_build_request_prepends_system() {
        let p = OpenAiProvider::new("k", "gpt-4o-mini");
        let req = p.build_request(&[Message::user("hi")], Some("be brief"));
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].content.as_deref(), Some("hi"));
        assert_eq!(req.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1}
        }"#;
        let parsed: OpenAiResponse = serde_json::from_str(body).unwrap();
        let resp = parsed.into_provider_response("gpt-4o").unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert_eq!(resp.usage.total(), 4);
    }

    #[test]
    fn test_parse_error_code() {
        let body = r#"{"error":{"message":"bad key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = OpenAiProvider::parse_error_response(reqwest::StatusCode::UNAUTHORIZED, body);
        assert!(matches!(err, ProviderError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let p = OpenAiProvider::new("", "gpt-4o");
        assert!(!p.is_available());
        let err = p.complete(vec![Message::user("hi")], None).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
