//! Server configuration from the environment

use std::time::Duration;

use agent_core::{AgentError, EngineConfig, Result};

/// Runtime settings for the HTTP server and the engine behind it
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: String,

    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `AGENT_MAX_TOOL_ROUNDS`, `AGENT_REQUEST_TIMEOUT_SECS`
    /// and `AGENT_SYSTEM_PROMPT`, falling back to defaults when unset
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = EngineConfig::default();

        let max_tool_rounds = match lookup("AGENT_MAX_TOOL_ROUNDS") {
            Some(raw) => parse_number("AGENT_MAX_TOOL_ROUNDS", &raw)?,
            None => defaults.max_tool_rounds,
        };
        let request_timeout = match lookup("AGENT_REQUEST_TIMEOUT_SECS") {
            Some(raw) => match parse_number::<u64>("AGENT_REQUEST_TIMEOUT_SECS", &raw)? {
                0 => {
                    return Err(AgentError::Config(
                        "AGENT_REQUEST_TIMEOUT_SECS must be greater than zero".into(),
                    ));
                }
                secs => Duration::from_secs(secs),
            },
            None => defaults.request_timeout,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            engine: EngineConfig {
                system_prompt: lookup("AGENT_SYSTEM_PROMPT")
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or(defaults.system_prompt),
                max_tool_rounds,
                request_timeout,
            },
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgentError::Config(format!("{key} must be a non-negative integer, got '{raw}'")))
}
