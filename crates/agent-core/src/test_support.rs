//! Scripted providers and factories for engine and registry tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgentError, RequestFailureKind, Result};
use crate::message::Message;
use crate::provider::{
    Completion, FinishReason, GenerationOptions, LlmProvider, ProviderBinding,
    ProviderDescriptor, ProviderFactory, ProviderOptions,
};

/// One scripted backend answer
pub enum Step {
    Reply(String),
    Fail(RequestFailureKind, String),
}

/// Backend that plays back a fixed script and records what it was sent
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    delay: Option<Duration>,
    sent: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|r| Step::Reply(r.into())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Histories received so far, one entry per call
    pub fn sent(&self) -> Vec<Vec<Message>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.sent.lock().unwrap().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(content)) => Ok(Completion {
                content,
                model: options.model.clone(),
                usage: None,
                finish_reason: Some(FinishReason::Stop),
            }),
            Some(Step::Fail(kind, message)) => Err(AgentError::provider(kind, message)),
            None => Err(AgentError::provider(
                RequestFailureKind::Backend,
                "script exhausted",
            )),
        }
    }
}

/// Factory over a fixed set of scripted backends
#[derive(Default)]
pub struct ScriptedFactory {
    providers: HashMap<String, Arc<ScriptedProvider>>,
}

impl ScriptedFactory {
    pub fn with(mut self, id: &str, provider: Arc<ScriptedProvider>) -> Self {
        self.providers.insert(id.to_string(), provider);
        self
    }
}

impl ProviderFactory for ScriptedFactory {
    fn create(&self, provider_id: &str, options: &ProviderOptions) -> Result<ProviderBinding> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| AgentError::UnsupportedProvider(provider_id.to_string()))?;
        Ok(ProviderBinding::new(
            provider_id,
            options.resolve(&format!("{provider_id}-default")),
            Arc::clone(provider) as Arc<dyn LlmProvider>,
        ))
    }

    fn catalog(&self) -> Vec<ProviderDescriptor> {
        let mut ids: Vec<_> = self.providers.keys().cloned().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| ProviderDescriptor {
                default_model: format!("{id}-default"),
                id,
            })
            .collect()
    }
}

/// Fenced tool request the scripted model can emit
pub fn tool_request(name: &str, arguments: &serde_json::Value) -> String {
    format!(
        "Let me use a tool.\n```tool\n{}\n```",
        serde_json::json!({"tool": name, "arguments": arguments})
    )
}
