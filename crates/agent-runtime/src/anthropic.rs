//! Anthropic Messages API provider

use agent_core::{
    error::Result,
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// User turn sent when the history has none to open with
const OPENING_TURN: &str = "Hello.";

// ── Request types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<TurnMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct TurnMessage {
    role: &'static str,
    content: String,
}

// ── Response types ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ── Provider ───────────────────────────────────────────────────────────────────

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http::client(),
            api_key,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Target a custom base URL (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Split out the system text and fold the rest into alternating turns.
///
/// The API wants a user turn first and no two turns of the same role in a
/// row; tool results travel as user turns.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<TurnMessage>) {
    let system_parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n"));

    let mut turns: Vec<TurnMessage> = Vec::new();
    for message in messages.iter().filter(|m| m.role != Role::System) {
        let role = http::chat_role(message.role);
        match turns.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => turns.push(TurnMessage {
                role,
                content: message.content.clone(),
            }),
        }
    }

    if turns.first().is_none_or(|t| t.role != "user") {
        turns.insert(
            0,
            TurnMessage {
                role: "user",
                content: OPENING_TURN.to_string(),
            },
        );
    }
    (system, turns)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| http::missing_key("claude", "CLAUDE_API_KEY"))?;

        let (system, turns) = convert_messages(messages);
        let request = MessagesRequest {
            model: &options.model,
            max_tokens: self.max_tokens,
            system,
            messages: turns,
            temperature: options.temperature,
            stop_sequences: (!options.stop_sequences.is_empty())
                .then_some(options.stop_sequences.as_slice()),
        };

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        tracing::debug!(model = %options.model, messages = request.messages.len(), "Sending request to Anthropic");

        let body = http::post_json(
            "claude",
            self.client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_API_VERSION),
            &request,
        )
        .await?;

        let response: MessagesResponse = http::decode("claude", &body)?;
        let content = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(Completion {
            content,
            model: response.model.unwrap_or_else(|| options.model.clone()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
            finish_reason: response.stop_reason.as_deref().map(FinishReason::from_backend),
        })
    }
}
