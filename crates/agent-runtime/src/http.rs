//! Shared plumbing for the reqwest-based adapters.

use std::time::Duration;

use agent_core::{AgentError, RequestFailureKind, Result, Role};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Longest slice of an error body carried into the error message
const BODY_PREVIEW: usize = 500;

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Role names used by chat-style APIs; tool results go back as user turns
pub(crate) const fn chat_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User | Role::ToolResult => "user",
        Role::Assistant => "assistant",
    }
}

pub(crate) fn missing_key(backend: &str, variable: &str) -> AgentError {
    AgentError::provider(
        RequestFailureKind::Auth,
        format!("{backend} has no API key configured (set {variable})"),
    )
}

pub(crate) fn status_error(backend: &str, status: StatusCode, body: &str) -> AgentError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RequestFailureKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => RequestFailureKind::RateLimited,
        _ => RequestFailureKind::Backend,
    };
    let preview: String = body.chars().take(BODY_PREVIEW).collect();
    AgentError::provider(kind, format!("{backend} HTTP {status}: {preview}"))
}

pub(crate) fn transport_error(backend: &str, err: &reqwest::Error) -> AgentError {
    let kind = if err.is_timeout() {
        RequestFailureKind::Timeout
    } else if err.is_decode() {
        RequestFailureKind::MalformedResponse
    } else {
        RequestFailureKind::Network
    };
    AgentError::provider(kind, format!("{backend}: {err}"))
}

pub(crate) fn decode<T: DeserializeOwned>(backend: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        AgentError::provider(
            RequestFailureKind::MalformedResponse,
            format!(
                "{backend} response did not parse: {e}; body: {}",
                body.chars().take(200).collect::<String>()
            ),
        )
    })
}

/// POST a JSON body and return the response text of a 2xx answer
pub(crate) async fn post_json(
    backend: &str,
    request: reqwest::RequestBuilder,
    body: &impl serde::Serialize,
) -> Result<String> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(backend, &e))?;

    let status = response.status();
    tracing::debug!(backend, status = %status.as_u16(), "Backend response received");

    let text = response
        .text()
        .await
        .map_err(|e| transport_error(backend, &e))?;

    if !status.is_success() {
        return Err(status_error(backend, status, &text));
    }
    Ok(text)
}
