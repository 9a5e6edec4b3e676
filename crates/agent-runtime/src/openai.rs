//! OpenAI-compatible chat completions provider
//!
//! One adapter serves every backend that speaks the `/chat/completions`
//! dialect (OpenAI, DeepSeek, Groq); they differ only in base URL and key.

use agent_core::{
    error::Result,
    message::Message,
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
    AgentError, RequestFailureKind,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Provider for any OpenAI-compatible endpoint
pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    api_key: Option<String>,
    key_variable: String,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// `key_variable` names the environment variable reported when the key is missing
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        key_variable: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            client: http::client(),
            api_key,
            key_variable: key_variable.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: http::chat_role(m.role),
                content: &m.content,
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| http::missing_key(&self.name, &self.key_variable))?;

        let request = ChatRequest {
            model: &options.model,
            messages: Self::convert_messages(messages),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: (!options.stop_sequences.is_empty()).then_some(options.stop_sequences.as_slice()),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        tracing::debug!(backend = %self.name, model = %options.model, messages = messages.len(), "Sending chat completion");

        let body = http::post_json(
            &self.name,
            self.client.post(&url).bearer_auth(api_key),
            &request,
        )
        .await?;

        let response: ChatResponse = http::decode(&self.name, &body)?;
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            AgentError::provider(
                RequestFailureKind::MalformedResponse,
                format!("{} returned no choices", self.name),
            )
        })?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| options.model.clone()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_backend),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "deepseek-chat".into(),
            ..GenerationOptions::default()
        }
    }

    fn provider(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("deepseek", Some("sk-test".into()), "DEEPSEEK_API_KEY")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn sends_full_history_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "hello"},
                    {"role": "user", "content": "[Tool 'echo' returned]\nhi"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "deepseek-chat",
                "choices": [{"message": {"role": "assistant", "content": "Hi!"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let history = [
            Message::system("sys"),
            Message::user("hello"),
            Message::tool_result("[Tool 'echo' returned]\nhi", None),
        ];
        let completion = provider(&server).complete(&history, &options()).await.unwrap();

        assert_eq!(completion.content, "Hi!");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 14);
    }

    #[tokio::test]
    async fn rate_limit_is_reported_as_such() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[Message::user("hi")], &options())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderRequest { kind: RequestFailureKind::RateLimited, .. }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .complete(&[Message::user("hi")], &options())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderRequest { kind: RequestFailureKind::MalformedResponse, .. }
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new("openai", None, "OPENAI_API_KEY")
            .with_base_url(server.uri());
        let err = provider
            .complete(&[Message::user("hi")], &options())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderRequest { kind: RequestFailureKind::Auth, .. }
        ));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
