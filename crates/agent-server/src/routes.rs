//! Router construction

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    create_thread, delete_thread, get_thread, greet, health_check, list_messages,
    list_providers, list_threads, send_message, set_provider,
};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/providers", get(list_providers))

        // Threads
        .route("/api/threads", post(create_thread).get(list_threads))
        .route("/api/threads/{id}", get(get_thread).delete(delete_thread))
        .route("/api/threads/{id}/messages", post(send_message).get(list_messages))
        .route("/api/threads/{id}/provider", put(set_provider))
        .route("/api/threads/{id}/greeting", post(greet))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
