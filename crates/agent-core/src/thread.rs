//! Thread Management
//!
//! A thread is one independent conversation bound to one backend at a time.
//! The [`ThreadRegistry`] owns every live thread and serializes mutating
//! operations per thread while letting different threads run in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::engine::{ConversationEngine, TurnState};
use crate::error::{AgentError, Result};
use crate::message::{History, Message};
use crate::provider::{ProviderBinding, ProviderDescriptor, ProviderFactory, ProviderOptions};

/// Unique thread identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only projection of a thread
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub thread_id: ThreadId,
    pub provider: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// One conversation: its history and the backend currently answering it
#[derive(Clone, Debug)]
pub struct Thread {
    id: ThreadId,
    history: History,
    binding: ProviderBinding,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    state: TurnState,
}

impl Thread {
    pub fn new(id: ThreadId, history: History, binding: ProviderBinding) -> Self {
        let now = Utc::now();
        Self {
            id,
            history,
            binding,
            created_at: now,
            updated_at: now,
            state: TurnState::Idle,
        }
    }

    pub const fn id(&self) -> &ThreadId {
        &self.id
    }

    pub const fn history(&self) -> &History {
        &self.history
    }

    pub const fn binding(&self) -> &ProviderBinding {
        &self.binding
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub const fn state(&self) -> TurnState {
        self.state
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            thread_id: self.id.clone(),
            provider: self.binding.provider_id().to_string(),
            model: self.binding.model().to_string(),
            created_at: self.created_at,
        }
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        self.updated_at = Utc::now();
        &mut self.history
    }

    pub(crate) fn set_state(&mut self, state: TurnState) {
        if self.state != state {
            tracing::trace!(thread = %self.id, from = ?self.state, to = ?state, "Turn state change");
            self.state = state;
        }
    }

    /// Swap the backend; history is left untouched
    pub(crate) fn rebind(&mut self, binding: ProviderBinding) -> ProviderBinding {
        self.updated_at = Utc::now();
        std::mem::replace(&mut self.binding, binding)
    }
}

/// Outcome of a completed turn
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnReply {
    /// Final assistant message of the turn
    pub message: Message,

    /// The thread as it stood when the turn committed, naming the backend
    /// that produced `message`
    pub thread: ThreadSummary,
}

enum TurnInput {
    Message(String),
    Greeting,
}

/// One live thread.
///
/// `turn` is held for the whole of a turn or rebind. Readers only touch
/// `committed`, which is replaced once a turn succeeds, so they never wait
/// on a backend call.
struct ThreadSlot {
    turn: Mutex<()>,
    committed: RwLock<Thread>,
}

/// Owned store of live threads.
///
/// Every operation is total: a failure leaves no partial state behind.
/// `send_message`, `greet` and `rebind` on the same thread queue behind a
/// per-thread lock; threads never block each other, and reads see the last
/// committed state.
pub struct ThreadRegistry {
    threads: RwLock<HashMap<ThreadId, Arc<ThreadSlot>>>,
    factory: Arc<dyn ProviderFactory>,
    engine: Arc<ConversationEngine>,
}

impl ThreadRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>, engine: Arc<ConversationEngine>) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            factory,
            engine,
        }
    }

    /// Create a thread bound to `provider_id`, seeded with the system prompt
    pub async fn create_thread(&self, provider_id: &str, options: &ProviderOptions) -> Result<Thread> {
        let binding = self.factory.create(provider_id, options)?;

        let mut threads = self.threads.write().await;
        let mut id = ThreadId::new();
        while threads.contains_key(&id) {
            id = ThreadId::new();
        }

        let thread = Thread::new(id.clone(), self.engine.seed_history(), binding);
        threads.insert(
            id,
            Arc::new(ThreadSlot {
                turn: Mutex::new(()),
                committed: RwLock::new(thread.clone()),
            }),
        );

        tracing::info!(
            thread = %thread.id(),
            provider = %thread.binding().provider_id(),
            model = %thread.binding().model(),
            "Created thread"
        );
        Ok(thread)
    }

    /// Snapshot of a thread
    pub async fn get_thread(&self, id: &ThreadId) -> Result<Thread> {
        let slot = self.slot(id).await?;
        let thread = slot.committed.read().await.clone();
        Ok(thread)
    }

    /// Summary of a single thread
    pub async fn list_thread(&self, id: &ThreadId) -> Result<ThreadSummary> {
        let slot = self.slot(id).await?;
        let summary = slot.committed.read().await.summary();
        Ok(summary)
    }

    /// Summaries of every live thread, oldest first
    pub async fn list(&self) -> Vec<ThreadSummary> {
        let slots: Vec<Arc<ThreadSlot>> = self.threads.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(slots.len());
        for slot in slots {
            summaries.push(slot.committed.read().await.summary());
        }
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    /// Copy of a thread's message history
    pub async fn history(&self, id: &ThreadId) -> Result<Vec<Message>> {
        let slot = self.slot(id).await?;
        let messages = slot.committed.read().await.history().messages().to_vec();
        Ok(messages)
    }

    /// Run one user turn on a thread and return the final assistant message.
    ///
    /// The turn runs in its own task: a caller that stops waiting does not
    /// interrupt it, and the rollback rule still applies to its outcome.
    pub async fn send_message(&self, id: &ThreadId, content: impl Into<String>) -> Result<TurnReply> {
        self.spawn_turn(id, TurnInput::Message(content.into())).await
    }

    /// Ask the model for an opening message on a thread with no turns yet
    pub async fn greet(&self, id: &ThreadId) -> Result<TurnReply> {
        self.spawn_turn(id, TurnInput::Greeting).await
    }

    async fn spawn_turn(&self, id: &ThreadId, input: TurnInput) -> Result<TurnReply> {
        let slot = self.slot(id).await?;
        let engine = Arc::clone(&self.engine);

        let turn = tokio::spawn(async move {
            let _turn = slot.turn.lock().await;
            let mut thread = slot.committed.read().await.clone();

            let message = match input {
                TurnInput::Message(content) => engine.run_turn(&mut thread, content).await?,
                TurnInput::Greeting => engine.greet(&mut thread).await?,
            };

            let summary = thread.summary();
            *slot.committed.write().await = thread;
            Ok::<_, AgentError>(TurnReply {
                message,
                thread: summary,
            })
        });

        turn.await
            .map_err(|e| AgentError::Other(format!("Turn on thread {id} aborted: {e}")))?
    }

    /// Switch a thread to another backend, keeping its history
    pub async fn rebind(
        &self,
        id: &ThreadId,
        provider_id: &str,
        options: &ProviderOptions,
    ) -> Result<Thread> {
        let slot = self.slot(id).await?;
        let binding = self.factory.create(provider_id, options)?;

        let _turn = slot.turn.lock().await;
        let mut thread = slot.committed.write().await;
        let previous = thread.rebind(binding);
        tracing::info!(
            thread = %id,
            from = %previous.provider_id(),
            to = %thread.binding().provider_id(),
            model = %thread.binding().model(),
            "Rebound thread"
        );
        Ok(thread.clone())
    }

    /// Drop a thread; its id is not handed out again
    pub async fn remove(&self, id: &ThreadId) -> Result<()> {
        if self.threads.write().await.remove(id).is_none() {
            return Err(AgentError::ThreadNotFound(id.to_string()));
        }
        tracing::info!(thread = %id, "Removed thread");
        Ok(())
    }

    /// Providers the factory can build
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.factory.catalog()
    }

    pub fn engine(&self) -> &ConversationEngine {
        &self.engine
    }

    /// Number of live threads
    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }

    async fn slot(&self, id: &ThreadId) -> Result<Arc<ThreadSlot>> {
        self.threads
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::ThreadNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::engine::EngineConfig;
    use crate::error::RequestFailureKind;
    use crate::message::Role;
    use crate::test_support::{ScriptedFactory, ScriptedProvider, Step, tool_request};
    use crate::tool::{EchoTool, ToolRegistry};

    fn registry(factory: ScriptedFactory) -> ThreadRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let engine = ConversationEngine::new(Arc::new(tools), EngineConfig::default());
        ThreadRegistry::new(Arc::new(factory), Arc::new(engine))
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn created_threads_are_seeded_and_unique() {
        let alpha = Arc::new(ScriptedProvider::replies(Vec::<String>::new()));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));

        let mut ids = HashSet::new();
        for _ in 0..20 {
            let thread = registry
                .create_thread("alpha", &ProviderOptions::default())
                .await
                .unwrap();
            assert_eq!(thread.history().len(), 1);
            assert_eq!(thread.history().messages()[0].role, Role::System);
            assert!(thread.history().messages()[0].content.contains("### echo"));
            assert_eq!(thread.binding().model(), "alpha-default");
            assert!(ids.insert(thread.id().clone()));
        }
        assert_eq!(registry.len().await, 20);
    }

    #[tokio::test]
    async fn unsupported_provider_creates_nothing() {
        let registry = registry(ScriptedFactory::default());

        let err = registry
            .create_thread("gamma", &ProviderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedProvider(ref id) if id == "gamma"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let registry = registry(ScriptedFactory::default());
        let id = ThreadId::from_string("never-issued");

        assert!(matches!(registry.get_thread(&id).await, Err(AgentError::ThreadNotFound(_))));
        assert!(matches!(registry.list_thread(&id).await, Err(AgentError::ThreadNotFound(_))));
        assert!(matches!(
            registry.send_message(&id, "hi").await,
            Err(AgentError::ThreadNotFound(_))
        ));
        assert!(matches!(
            registry.rebind(&id, "alpha", &ProviderOptions::default()).await,
            Err(AgentError::ThreadNotFound(_))
        ));
        assert!(matches!(registry.remove(&id).await, Err(AgentError::ThreadNotFound(_))));
    }

    #[tokio::test]
    async fn hello_turn_appends_user_then_assistant() {
        let alpha = Arc::new(ScriptedProvider::replies(["Hello there!"]));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let reply = registry.send_message(thread.id(), "hello").await.unwrap();

        let history = registry.history(thread.id()).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[1].content, "hello");
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(history[2], reply.message);
        assert_eq!(reply.thread.provider, "alpha");
    }

    #[tokio::test]
    async fn echo_tool_round_trip_extends_history_by_four() {
        let alpha = Arc::new(ScriptedProvider::replies([
            tool_request("echo", &json!({"text": "hi"})),
            "You said hi.".to_string(),
        ]));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let reply = registry.send_message(thread.id(), "echo hi").await.unwrap();
        assert_eq!(reply.message.content, "You said hi.");

        let history = registry.history(thread.id()).await.unwrap();
        assert_eq!(history.len(), 1 + 2 + 2);
        assert_eq!(
            roles(&history[1..]),
            vec![Role::User, Role::Assistant, Role::ToolResult, Role::Assistant]
        );
        let request = history[2].tool_call.as_ref().unwrap();
        assert_eq!(request.name, "echo");
        assert_eq!(history[3].tool_call_id, request.id);
        assert!(history[3].content.ends_with("hi"));
        assert!(history[4].tool_call.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_request_still_completes_turn() {
        let alpha = Arc::new(ScriptedProvider::replies([
            tool_request("send_transaction", &json!({"to": "0x0"})),
            "That tool is unavailable.".to_string(),
        ]));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let reply = registry.send_message(thread.id(), "send tokens").await.unwrap();
        assert_eq!(reply.message.content, "That tool is unavailable.");

        let history = registry.history(thread.id()).await.unwrap();
        assert!(history[3].content.contains("Unknown tool 'send_transaction'"));
    }

    #[tokio::test]
    async fn failed_send_leaves_history_unchanged_and_thread_usable() {
        let alpha = Arc::new(ScriptedProvider::new([
            Step::Fail(RequestFailureKind::RateLimited, "HTTP 429".into()),
            Step::Reply("Recovered.".into()),
        ]));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();
        let before = registry.history(thread.id()).await.unwrap();

        let err = registry.send_message(thread.id(), "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::ProviderRequest { .. }));
        assert_eq!(registry.history(thread.id()).await.unwrap(), before);

        registry.send_message(thread.id(), "hello").await.unwrap();
        assert_eq!(registry.history(thread.id()).await.unwrap().len(), before.len() + 2);
    }

    #[tokio::test]
    async fn rebind_swaps_backend_and_keeps_history() {
        let alpha = Arc::new(ScriptedProvider::replies(["from alpha"]));
        let beta = Arc::new(ScriptedProvider::replies(["from beta"]));
        let registry = registry(
            ScriptedFactory::default()
                .with("alpha", Arc::clone(&alpha))
                .with("beta", Arc::clone(&beta)),
        );
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();
        registry.send_message(thread.id(), "first").await.unwrap();
        let before = registry.history(thread.id()).await.unwrap();

        let options = ProviderOptions {
            model: Some("beta-large".into()),
            temperature: Some(0.2),
        };
        let rebound = registry.rebind(thread.id(), "beta", &options).await.unwrap();
        assert_eq!(rebound.binding().provider_id(), "beta");
        assert_eq!(rebound.binding().model(), "beta-large");
        assert_eq!(rebound.history().messages(), before.as_slice());
        assert_eq!(rebound.created_at(), thread.created_at());

        let reply = registry.send_message(thread.id(), "second").await.unwrap();
        assert_eq!(reply.message.content, "from beta");
        assert_eq!(reply.thread.provider, "beta");
        assert_eq!(reply.thread.model, "beta-large");
        assert_eq!(alpha.calls(), 1);
        assert_eq!(beta.sent()[0].len(), before.len() + 1);
    }

    #[tokio::test]
    async fn failed_rebind_keeps_old_binding() {
        let alpha = Arc::new(ScriptedProvider::replies(Vec::<String>::new()));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let err = registry
            .rebind(thread.id(), "gamma", &ProviderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedProvider(_)));

        let summary = registry.list_thread(thread.id()).await.unwrap();
        assert_eq!(summary.provider, "alpha");
        assert_eq!(summary.model, "alpha-default");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_sends_on_one_thread_do_not_interleave() {
        let alpha = Arc::new(
            ScriptedProvider::replies(["one", "two", "three"]).with_delay(Duration::from_millis(20)),
        );
        let registry = Arc::new(registry(ScriptedFactory::default().with("alpha", alpha)));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let sends = (0..3).map(|i| {
            let registry = Arc::clone(&registry);
            let id = thread.id().clone();
            async move { registry.send_message(&id, format!("message {i}")).await }
        });
        for result in futures::future::join_all(sends).await {
            result.unwrap();
        }

        let history = registry.history(thread.id()).await.unwrap();
        assert_eq!(
            roles(&history[1..]),
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_threads_run_in_parallel() {
        let alpha = Arc::new(
            ScriptedProvider::replies(["a", "b"]).with_delay(Duration::from_millis(200)),
        );
        let registry = Arc::new(registry(ScriptedFactory::default().with("alpha", alpha)));
        let first = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();
        let second = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(
            registry.send_message(first.id(), "x"),
            registry.send_message(second.id(), "y")
        );
        a.unwrap();
        b.unwrap();
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_send_still_completes() {
        let alpha = Arc::new(
            ScriptedProvider::replies(["eventually"]).with_delay(Duration::from_secs(10)),
        );
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), registry.send_message(thread.id(), "hi"))
                .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = registry.get_thread(thread.id()).await.unwrap();
        assert_eq!(snapshot.history().len(), 3);
        assert_eq!(snapshot.history().last().unwrap().content, "eventually");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_wait_for_an_in_flight_turn() {
        let alpha = Arc::new(
            ScriptedProvider::replies(["slow answer"]).with_delay(Duration::from_secs(30)),
        );
        let registry = Arc::new(registry(ScriptedFactory::default().with("alpha", alpha)));
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let turn = {
            let registry = Arc::clone(&registry);
            let id = thread.id().clone();
            tokio::spawn(async move { registry.send_message(&id, "hello").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let quick = Duration::from_millis(10);
        let listed = tokio::time::timeout(quick, registry.list()).await.unwrap();
        assert_eq!(listed.len(), 1);
        let summary = tokio::time::timeout(quick, registry.list_thread(thread.id()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.provider, "alpha");
        let history = tokio::time::timeout(quick, registry.history(thread.id()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.len(), 1);
        let snapshot = tokio::time::timeout(quick, registry.get_thread(thread.id()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.state(), TurnState::Idle);

        turn.await.unwrap().unwrap();
        assert_eq!(registry.history(thread.id()).await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reply_names_the_backend_that_answered_despite_queued_rebind() {
        let alpha = Arc::new(
            ScriptedProvider::replies(["from alpha"]).with_delay(Duration::from_secs(5)),
        );
        let beta = Arc::new(ScriptedProvider::replies(Vec::<String>::new()));
        let registry = registry(
            ScriptedFactory::default()
                .with("alpha", alpha)
                .with("beta", Arc::clone(&beta)),
        );
        let thread = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        let (reply, rebound) = tokio::join!(registry.send_message(thread.id(), "hello"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry
                .rebind(thread.id(), "beta", &ProviderOptions::default())
                .await
        });

        let reply = reply.unwrap();
        assert_eq!(reply.message.content, "from alpha");
        assert_eq!(reply.thread.provider, "alpha");
        assert_eq!(reply.thread.model, "alpha-default");

        let rebound = rebound.unwrap();
        assert_eq!(rebound.binding().provider_id(), "beta");
        assert_eq!(rebound.history().len(), 3);
        assert_eq!(beta.calls(), 0);
    }

    #[tokio::test]
    async fn removed_threads_disappear_from_listing() {
        let alpha = Arc::new(ScriptedProvider::replies(Vec::<String>::new()));
        let registry = registry(ScriptedFactory::default().with("alpha", alpha));
        let first = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();
        let second = registry
            .create_thread("alpha", &ProviderOptions::default())
            .await
            .unwrap();

        registry.remove(first.id()).await.unwrap();

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].thread_id, *second.id());
        assert!(matches!(
            registry.get_thread(first.id()).await,
            Err(AgentError::ThreadNotFound(_))
        ));
    }
}
