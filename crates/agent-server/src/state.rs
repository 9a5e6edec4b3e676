//! Application State

use std::sync::Arc;

use agent_core::{ThreadRegistry, ToolRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Every live conversation thread
    pub threads: Arc<ThreadRegistry>,
}

impl AppState {
    pub fn new(threads: ThreadRegistry) -> Self {
        Self {
            threads: Arc::new(threads),
        }
    }

    /// Tools available to every thread
    pub fn tools(&self) -> &ToolRegistry {
        self.threads.engine().tools()
    }
}
