//! agent-server
//!
//! Axum-based REST API over multi-provider conversation threads.

mod config;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{ConversationEngine, DateTimeTool, EchoTool, ProviderFactory, ThreadRegistry, ToolRegistry};
use agent_runtime::BackendFactory;

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    tools.register(DateTimeTool);

    tracing::info!("Registered {} tools:", tools.len());
    for name in tools.names() {
        tracing::info!("  • {}", name);
    }

    // Backends
    let factory = Arc::new(BackendFactory::from_env());
    for provider in factory.catalog() {
        tracing::info!("  Provider: {} (default model {})", provider.id, provider.default_model);
    }

    let engine = Arc::new(ConversationEngine::new(Arc::new(tools), config.engine.clone()));
    tracing::info!(
        max_tool_rounds = config.engine.max_tool_rounds,
        request_timeout_secs = config.engine.request_timeout.as_secs(),
        "Engine configured"
    );

    let state = AppState::new(ThreadRegistry::new(factory, engine));
    let app = routes::app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("agent-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                        - Health check");
    tracing::info!("  GET    /api/providers                 - Supported providers");
    tracing::info!("  POST   /api/threads                   - Create thread");
    tracing::info!("  GET    /api/threads                   - List threads");
    tracing::info!("  GET    /api/threads/{{id}}              - Thread summary");
    tracing::info!("  DELETE /api/threads/{{id}}              - Remove thread");
    tracing::info!("  POST   /api/threads/{{id}}/messages     - Send message");
    tracing::info!("  GET    /api/threads/{{id}}/messages     - Thread history");
    tracing::info!("  PUT    /api/threads/{{id}}/provider     - Switch provider");
    tracing::info!("  POST   /api/threads/{{id}}/greeting     - Opening message");

    axum::serve(listener, app).await?;

    Ok(())
}
