//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM backends (OpenAI, DeepSeek, Claude,
//! Groq, Ollama, ...) allowing a thread to switch backends without touching
//! its history.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{ProviderFactory, ProviderOptions};
//!
//! // Build a binding through a factory
//! let binding = factory.create("openai", &ProviderOptions::default())?;
//!
//! // Send the full history, get one assistant message back
//! let reply = binding.send(history.messages(), timeout).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, RequestFailureKind, Result};
use crate::message::Message;
use crate::tool::ToolCall;

/// Sampling temperature used when the caller does not pick one
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Configuration for LLM generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "deepseek-chat", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 { DEFAULT_TEMPERATURE }
const fn default_max_tokens() -> u32 { 2048 }
const fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Caller-facing options for creating or rebinding a thread
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Backend-specific model; the provider default is used when absent
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature; [`DEFAULT_TEMPERATURE`] when absent
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ProviderOptions {
    /// Resolve against a provider's default model
    pub fn resolve(&self, default_model: &str) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone().unwrap_or_else(|| default_model.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            ..GenerationOptions::default()
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

impl FinishReason {
    /// Map a backend's finish/stop reason string
    pub fn from_backend(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Error,
        }
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// Threads talk to backends exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Generate a completion from the full message history.
    ///
    /// Failures must be reported as [`AgentError::ProviderRequest`].
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion>;
}

/// A provider known to a factory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Identifier accepted by [`ProviderFactory::create`]
    pub id: String,
    /// Model used when the caller does not choose one
    pub default_model: String,
}

/// Maps a provider identifier plus options to a live binding
pub trait ProviderFactory: Send + Sync {
    /// Fails with [`AgentError::UnsupportedProvider`] for unknown identifiers
    fn create(&self, provider_id: &str, options: &ProviderOptions) -> Result<ProviderBinding>;

    /// Every provider this factory can build
    fn catalog(&self) -> Vec<ProviderDescriptor>;
}

/// The backend currently serving a thread
#[derive(Clone)]
pub struct ProviderBinding {
    provider_id: String,
    generation: GenerationOptions,
    adapter: Arc<dyn LlmProvider>,
}

impl ProviderBinding {
    pub fn new(
        provider_id: impl Into<String>,
        generation: GenerationOptions,
        adapter: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            generation,
            adapter,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn model(&self) -> &str {
        &self.generation.model
    }

    pub const fn temperature(&self) -> f32 {
        self.generation.temperature
    }

    pub const fn generation(&self) -> &GenerationOptions {
        &self.generation
    }

    /// Send the full history and turn the completion into an assistant message.
    ///
    /// The call is bounded by `timeout`; expiry is reported as a provider
    /// request failure. A reply that embeds a tool request comes back with
    /// [`Message::tool_call`] set.
    pub async fn send(&self, history: &[Message], timeout: Duration) -> Result<Message> {
        tracing::debug!(
            provider = %self.provider_id,
            model = %self.generation.model,
            messages = history.len(),
            "Sending history to provider"
        );

        let completion = tokio::time::timeout(timeout, self.adapter.complete(history, &self.generation))
            .await
            .map_err(|_| {
                AgentError::provider(
                    RequestFailureKind::Timeout,
                    format!(
                        "{} did not answer within {}s",
                        self.adapter.name(),
                        timeout.as_secs()
                    ),
                )
            })??;

        if completion.content.trim().is_empty() {
            return Err(AgentError::provider(
                RequestFailureKind::MalformedResponse,
                format!("{} returned an empty completion", self.adapter.name()),
            ));
        }

        let tokens = completion.usage.as_ref().map(|u| u.completion_tokens);
        let message = match ToolCall::parse(&completion.content) {
            Some(call) => Message::assistant_with_tool_call(completion.content, call),
            None => Message::assistant(completion.content),
        };
        Ok(message.with_model(completion.model, tokens))
    }
}

impl std::fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("provider_id", &self.provider_id)
            .field("model", &self.generation.model)
            .field("temperature", &self.generation.temperature)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}
