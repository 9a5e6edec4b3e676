//! Closed set of supported backends and the factory that builds them.

use std::sync::Arc;

use agent_core::{
    AgentError, LlmProvider, ProviderBinding, ProviderDescriptor, ProviderFactory,
    ProviderOptions, Result,
};

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiCompatProvider;

#[cfg(feature = "ollama")]
use crate::ollama::{OllamaConfig, OllamaProvider};

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Every backend a thread can be bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    OpenAi,
    DeepSeek,
    Claude,
    Groq,
    Llama,
    #[cfg(feature = "ollama")]
    Ollama,
}

impl Backend {
    pub const ALL: &'static [Self] = &[
        Self::OpenAi,
        Self::DeepSeek,
        Self::Claude,
        Self::Groq,
        Self::Llama,
        #[cfg(feature = "ollama")]
        Self::Ollama,
    ];

    /// Resolve a provider identifier; matching ignores case
    pub fn parse(provider_id: &str) -> Option<Self> {
        match provider_id.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "deepseek" => Some(Self::DeepSeek),
            "claude" | "anthropic" => Some(Self::Claude),
            "groq" => Some(Self::Groq),
            "llama" => Some(Self::Llama),
            #[cfg(feature = "ollama")]
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Canonical identifier recorded on bindings
    pub const fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Claude => "claude",
            Self::Groq => "groq",
            Self::Llama => "llama",
            #[cfg(feature = "ollama")]
            Self::Ollama => "ollama",
        }
    }

    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::DeepSeek => "deepseek-chat",
            Self::Claude => "claude-3-sonnet-20240229",
            Self::Groq => "qwen-2.5-32b",
            Self::Llama => "llama-3.3-70b-specdec",
            #[cfg(feature = "ollama")]
            Self::Ollama => "llama3.2",
        }
    }

    /// Environment variable holding the API key, if the backend needs one
    pub const fn key_variable(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Claude => Some("CLAUDE_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Llama => Some("LLAMA_API_KEY"),
            #[cfg(feature = "ollama")]
            Self::Ollama => None,
        }
    }
}

/// API keys and endpoint overrides
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: Option<String>,
    pub claude_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub llama_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_value("OPENAI_API_KEY"),
            deepseek_api_key: env_value("DEEPSEEK_API_KEY"),
            deepseek_base_url: env_value("DEEPSEEK_BASE_URL"),
            claude_api_key: env_value("CLAUDE_API_KEY").or_else(|| env_value("ANTHROPIC_API_KEY")),
            groq_api_key: env_value("GROQ_API_KEY"),
            llama_api_key: env_value("LLAMA_API_KEY"),
        }
    }

    fn key_for(&self, backend: Backend) -> Option<&String> {
        match backend {
            Backend::OpenAi => self.openai_api_key.as_ref(),
            Backend::DeepSeek => self.deepseek_api_key.as_ref(),
            Backend::Claude => self.claude_api_key.as_ref(),
            Backend::Groq => self.groq_api_key.as_ref(),
            Backend::Llama => self.llama_api_key.as_ref(),
            #[cfg(feature = "ollama")]
            Backend::Ollama => None,
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builds bindings for the closed [`Backend`] set.
///
/// A missing API key does not stop creation; the first request on the
/// binding fails with an auth error instead.
#[derive(Clone, Debug, Default)]
pub struct BackendFactory {
    credentials: Credentials,
    #[cfg(feature = "ollama")]
    ollama: OllamaConfig,
}

impl BackendFactory {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            #[cfg(feature = "ollama")]
            ollama: OllamaConfig::default(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            credentials: Credentials::from_env(),
            #[cfg(feature = "ollama")]
            ollama: OllamaConfig::from_env(),
        }
    }

    #[cfg(feature = "ollama")]
    pub fn with_ollama(mut self, config: OllamaConfig) -> Self {
        self.ollama = config;
        self
    }

    fn adapter(&self, backend: Backend) -> Arc<dyn LlmProvider> {
        let key = self.credentials.key_for(backend).cloned();
        if key.is_none() {
            if let Some(variable) = backend.key_variable() {
                tracing::warn!(provider = backend.id(), variable, "No API key configured; requests will fail");
            }
        }

        match backend {
            Backend::OpenAi => Arc::new(OpenAiCompatProvider::new("openai", key, "OPENAI_API_KEY")),
            Backend::DeepSeek => Arc::new(
                OpenAiCompatProvider::new("deepseek", key, "DEEPSEEK_API_KEY").with_base_url(
                    self.credentials
                        .deepseek_base_url
                        .clone()
                        .unwrap_or_else(|| DEEPSEEK_BASE_URL.to_string()),
                ),
            ),
            Backend::Claude => Arc::new(AnthropicProvider::new(key)),
            Backend::Groq => Arc::new(
                OpenAiCompatProvider::new("groq", key, "GROQ_API_KEY").with_base_url(GROQ_BASE_URL),
            ),
            Backend::Llama => Arc::new(
                OpenAiCompatProvider::new("llama", key, "LLAMA_API_KEY").with_base_url(GROQ_BASE_URL),
            ),
            #[cfg(feature = "ollama")]
            Backend::Ollama => Arc::new(OllamaProvider::from_config(self.ollama.clone())),
        }
    }
}

impl ProviderFactory for BackendFactory {
    fn create(&self, provider_id: &str, options: &ProviderOptions) -> Result<ProviderBinding> {
        let backend = Backend::parse(provider_id)
            .ok_or_else(|| AgentError::UnsupportedProvider(provider_id.to_string()))?;

        Ok(ProviderBinding::new(
            backend.id(),
            options.resolve(backend.default_model()),
            self.adapter(backend),
        ))
    }

    fn catalog(&self) -> Vec<ProviderDescriptor> {
        Backend::ALL
            .iter()
            .map(|b| ProviderDescriptor {
                id: b.id().to_string(),
                default_model: b.default_model().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_resolve_case_insensitively() {
        assert_eq!(Backend::parse("OpenAI"), Some(Backend::OpenAi));
        assert_eq!(Backend::parse("anthropic"), Some(Backend::Claude));
        assert_eq!(Backend::parse("gemini"), None);
        assert_eq!(Backend::parse(""), None);
    }

    #[test]
    fn create_applies_backend_defaults() {
        let factory = BackendFactory::new(Credentials::default());

        let binding = factory.create("deepseek", &ProviderOptions::default()).unwrap();
        assert_eq!(binding.provider_id(), "deepseek");
        assert_eq!(binding.model(), "deepseek-chat");
        assert!((binding.temperature() - 0.7).abs() < f32::EPSILON);

        let binding = factory.create("anthropic", &ProviderOptions::default()).unwrap();
        assert_eq!(binding.provider_id(), "claude");
        assert_eq!(binding.model(), "claude-3-sonnet-20240229");
    }

    #[test]
    fn create_honours_caller_options() {
        let factory = BackendFactory::new(Credentials::default());
        let options = ProviderOptions {
            model: Some("gpt-4o".into()),
            temperature: Some(0.1),
        };

        let binding = factory.create("openai", &options).unwrap();
        assert_eq!(binding.model(), "gpt-4o");
        assert!((binding.temperature() - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_identifier_is_unsupported() {
        let factory = BackendFactory::new(Credentials::default());
        let err = factory.create("gemini", &ProviderOptions::default()).unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedProvider(ref id) if id == "gemini"));
    }

    #[test]
    fn catalog_lists_every_backend() {
        let catalog = BackendFactory::default().catalog();
        assert_eq!(catalog.len(), Backend::ALL.len());
        assert!(catalog.iter().any(|d| d.id == "groq" && d.default_model == "qwen-2.5-32b"));
        for descriptor in &catalog {
            assert_eq!(Backend::parse(&descriptor.id).map(Backend::id), Some(descriptor.id.as_str()));
        }
    }

    #[tokio::test]
    async fn missing_key_surfaces_on_first_send() {
        let factory = BackendFactory::new(Credentials::default());
        let binding = factory.create("groq", &ProviderOptions::default()).unwrap();

        let err = binding
            .send(&[agent_core::Message::user("hi")], std::time::Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ProviderRequest { kind: agent_core::RequestFailureKind::Auth, .. }
        ));
    }
}
