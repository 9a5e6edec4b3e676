//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// What went wrong when talking to a model backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestFailureKind {
    /// Credentials missing or rejected
    Auth,
    /// Backend throttled the request
    RateLimited,
    /// Transport-level failure (DNS, connect, reset)
    Network,
    /// No answer within the configured request timeout
    Timeout,
    /// Response could not be decoded or was empty
    MalformedResponse,
    /// Any other non-success answer from the backend
    Backend,
}

impl std::fmt::Display for RequestFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Auth => "auth",
            Self::RateLimited => "rate limited",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformed response",
            Self::Backend => "backend",
        };
        f.write_str(label)
    }
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Provider identifier matches no known backend
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Thread id was never issued or has been removed
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    /// Opening greeting requested on a thread that already has turns
    #[error("Thread already started: {0}")]
    ThreadAlreadyStarted(String),

    /// Backend request failed; carries the backend error text
    #[error("Provider request failed ({kind}): {message}")]
    ProviderRequest {
        kind: RequestFailureKind,
        message: String,
    },

    /// The model kept requesting tools past the configured bound
    #[error("Tool chain exceeded {0} rounds")]
    ToolChainLimitExceeded(usize),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments did not match the parameter schema
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Shorthand for a [`AgentError::ProviderRequest`]
    pub fn provider(kind: RequestFailureKind, message: impl Into<String>) -> Self {
        Self::ProviderRequest {
            kind,
            message: message.into(),
        }
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderRequest {
                kind: RequestFailureKind::RateLimited
                    | RequestFailureKind::Network
                    | RequestFailureKind::Timeout,
                ..
            }
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedProvider(id) => format!("The provider '{id}' is not supported."),
            Self::ThreadNotFound(id) => format!("Thread '{id}' does not exist."),
            Self::ThreadAlreadyStarted(_) => {
                "This conversation has already started; greetings are only sent first.".into()
            }
            Self::ProviderRequest { kind, message } => match kind {
                RequestFailureKind::Auth => {
                    "Authentication with the AI service failed. Please check your credentials.".into()
                }
                RequestFailureKind::RateLimited => {
                    "You've made too many requests. Please wait a moment.".into()
                }
                RequestFailureKind::Network | RequestFailureKind::Timeout => {
                    "The AI service is currently unavailable. Please try again.".into()
                }
                RequestFailureKind::MalformedResponse | RequestFailureKind::Backend => {
                    format!("The AI service encountered an error: {message}")
                }
            },
            Self::ToolChainLimitExceeded(_) => {
                "The request took too many tool steps. Please try a simpler query.".into()
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
