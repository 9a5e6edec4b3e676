//! Conversation Messages
//!
//! Standard message format used across the agent system, plus the ordered
//! [`History`] a thread accumulates turn by turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    ToolResult,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::ToolResult => write!(f, "tool-result"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Tool the assistant asked to run (assistant messages only)
    #[serde(default, rename = "toolCallRequest", skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,

    /// Request this tool result answers (tool-result messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Additional message metadata
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Token count (if known)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    /// Model that generated this (for assistant messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that requests a tool
    pub fn assistant_with_tool_call(content: impl Into<String>, call: ToolCall) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_call = Some(call);
        msg
    }

    /// Create a tool result message
    pub fn tool_result(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        let mut msg = Self::new(Role::ToolResult, content);
        msg.tool_call_id = tool_call_id;
        msg
    }

    /// Record which model produced the message and its token cost
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, tokens: Option<u32>) -> Self {
        self.metadata = Some(MessageMetadata {
            tokens,
            model: Some(model.into()),
        });
        self
    }

    /// Whether this message asks for a tool to be run
    pub const fn requests_tool(&self) -> bool {
        self.tool_call.is_some()
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        // ~4 characters per token is a rough estimate
        u32::try_from(self.content.len() / 4).unwrap_or(u32::MAX).saturating_add(4)
    }
}

/// Ordered conversation history.
///
/// Always starts with exactly one system message; the only way to shrink it is
/// [`History::rollback`], which never removes the seed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    /// Start a history from its system prompt
    pub fn seeded(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Only the seeded system prompt is present
    pub fn is_system_only(&self) -> bool {
        self.messages.len() == 1
    }

    /// Drop everything appended after `checkpoint` messages
    pub(crate) fn rollback(&mut self, checkpoint: usize) {
        self.messages.truncate(checkpoint.max(1));
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true for a seeded history
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(!msg.requests_tool());
    }

    #[test]
    fn roles_serialize_with_wire_names() {
        let json = serde_json::to_string(&Message::tool_result("ok", Some("c1".into()))).unwrap();
        assert!(json.contains(r#""role":"tool-result""#));
        assert!(json.contains(r#""toolCallId":"c1""#));
        assert_eq!(Role::ToolResult.to_string(), "tool-result");
    }

    #[test]
    fn test_history() {
        let mut history = History::seeded("You are helpful.");
        history.push(Message::user("Hi"));
        history.push(Message::assistant("Hello!"));

        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().role, Role::Assistant);
        assert!(!history.is_system_only());
    }

    #[test]
    fn rollback_never_removes_the_seed() {
        let mut history = History::seeded("sys");
        history.push(Message::user("Hi"));
        history.rollback(0);

        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
    }
}
