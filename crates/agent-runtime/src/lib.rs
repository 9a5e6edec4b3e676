//! # agent-runtime
//!
//! Concrete backends for agent-core threads.
//!
//! ## Providers
//!
//! - **OpenAI-compatible** chat completions: `openai`, `deepseek`, `groq`, `llama`
//! - **Anthropic** Messages API: `claude` (alias `anthropic`)
//! - **Ollama** (default feature): local inference via `ollama-rs`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::BackendFactory;
//!
//! let factory = Arc::new(BackendFactory::from_env());
//! let registry = ThreadRegistry::new(factory, engine);
//! let thread = registry.create_thread("deepseek", &ProviderOptions::default()).await?;
//! ```

mod http;

pub mod anthropic;
pub mod factory;
pub mod openai;

#[cfg(feature = "ollama")]
pub mod ollama;

pub use anthropic::AnthropicProvider;
pub use factory::{Backend, BackendFactory, Credentials};
pub use openai::OpenAiCompatProvider;

#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;

// Re-export core types for convenience
pub use agent_core::{
    AgentError, LlmProvider, Message, ProviderFactory, ProviderOptions, Result, Role,
};
