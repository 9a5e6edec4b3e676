//! # agent-core
//!
//! Provider-agnostic conversation threads with a text-protocol tool loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     ThreadRegistry                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │Conversation │  │    Tools    │  │  ProviderBinding    │  │
//! │  │   Engine    │──│   Registry  │  │  (LlmProvider via   │  │
//! │  │             │──────────────────│   ProviderFactory)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each thread owns its history and one binding. The binding can be swapped
//! between turns without touching the history, and a failed turn leaves the
//! history exactly as it was.

pub mod engine;
pub mod error;
pub mod message;
pub mod provider;
pub mod thread;
pub mod tool;

#[cfg(test)]
mod test_support;

pub use engine::{ConversationEngine, EngineConfig, TurnState, DEFAULT_SYSTEM_PROMPT};
pub use error::{AgentError, RequestFailureKind, Result};
pub use message::{History, Message, Role};
pub use provider::{
    Completion, GenerationOptions, LlmProvider, ProviderBinding, ProviderDescriptor,
    ProviderFactory, ProviderOptions,
};
pub use thread::{Thread, ThreadId, ThreadRegistry, ThreadSummary, TurnReply};
pub use tool::{
    DateTimeTool, EchoTool, ParamType, ParameterSchema, Tool, ToolCall, ToolOutcome,
    ToolRegistry, ToolSchema,
};
