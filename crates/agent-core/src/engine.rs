//! Conversation Engine
//!
//! Runs one turn of a thread: send the history, and while the reply asks for a
//! tool, resolve it, feed the result back and ask again. A turn either
//! completes with a final assistant message or leaves the history exactly as
//! it was when the turn started.
//!
//! ```text
//!   Idle ──► AwaitingResponse ──► Responded ──► Idle
//!                 ▲                   │
//!                 └── ResolvingTool ◄─┘ (reply carried a tool request)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{AgentError, Result};
use crate::message::{History, Message};
use crate::thread::Thread;
use crate::tool::ToolRegistry;

/// Where a thread is inside its current turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No request outstanding
    #[default]
    Idle,
    /// `send` in flight
    AwaitingResponse,
    /// An assistant message has been appended
    Responded,
    /// Running the tool the last reply asked for
    ResolvingTool,
}

/// Engine configuration
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// System prompt template; tool descriptions are appended to it
    pub system_prompt: String,

    /// Tool rounds allowed in a single turn before failing closed
    pub max_tool_rounds: usize,

    /// Upper bound on each backend call
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_tool_rounds: 10,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Prompt every new thread starts from
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

Request at most one tool per reply. After receiving tool results, synthesize
them into a helpful response. If you can answer directly without tools, do so.
Be concise and accurate."#;

/// Drives turns against a thread's current binding
pub struct ConversationEngine {
    tools: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl ConversationEngine {
    pub const fn new(tools: Arc<ToolRegistry>, config: EngineConfig) -> Self {
        Self { tools, config }
    }

    /// Create with default configuration
    pub fn with_defaults(tools: Arc<ToolRegistry>) -> Self {
        Self::new(tools, EngineConfig::default())
    }

    /// History a new thread starts with: the prompt plus every tool description
    pub fn seed_history(&self) -> History {
        let mut prompt = self.config.system_prompt.clone();
        prompt.push_str("\n\n");
        prompt.push_str(&self.tools.describe_all());
        History::seeded(prompt)
    }

    /// Run one user turn, returning the final assistant message
    pub async fn run_turn(&self, thread: &mut Thread, input: impl Into<String>) -> Result<Message> {
        let checkpoint = thread.history().len();
        thread.history_mut().push(Message::user(input));
        self.settle(thread, checkpoint).await
    }

    /// Ask the model to open a conversation that has no user input yet
    pub async fn greet(&self, thread: &mut Thread) -> Result<Message> {
        if !thread.history().is_system_only() {
            return Err(AgentError::ThreadAlreadyStarted(thread.id().to_string()));
        }
        let checkpoint = thread.history().len();
        self.settle(thread, checkpoint).await
    }

    async fn settle(&self, thread: &mut Thread, checkpoint: usize) -> Result<Message> {
        let result = self.resolve_tool_chain(thread).await;
        if let Err(e) = &result {
            tracing::warn!(
                thread = %thread.id(),
                discarded = thread.history().len() - checkpoint,
                error = %e,
                "Turn failed, rolling back history"
            );
            thread.history_mut().rollback(checkpoint);
        }
        thread.set_state(TurnState::Idle);
        result
    }

    async fn resolve_tool_chain(&self, thread: &mut Thread) -> Result<Message> {
        let mut rounds = 0;

        loop {
            thread.set_state(TurnState::AwaitingResponse);
            let reply = thread
                .binding()
                .send(thread.history().messages(), self.config.request_timeout)
                .await?;

            thread.set_state(TurnState::Responded);
            let call = reply.tool_call.clone();
            thread.history_mut().push(reply.clone());

            let Some(call) = call else {
                return Ok(reply);
            };

            if rounds == self.config.max_tool_rounds {
                return Err(AgentError::ToolChainLimitExceeded(self.config.max_tool_rounds));
            }
            rounds += 1;

            thread.set_state(TurnState::ResolvingTool);
            tracing::debug!(thread = %thread.id(), tool = %call.name, round = rounds, "Resolving tool call");
            let outcome = self.tools.resolve(&call).await;
            thread
                .history_mut()
                .push(Message::tool_result(outcome.summary(), outcome.id));
        }
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}
