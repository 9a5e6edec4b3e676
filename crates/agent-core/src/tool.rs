//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered once, described to the model through the system prompt,
//! and resolved by the conversation engine whenever a reply asks for one.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, Result};

/// Fence that opens a tool request inside an assistant reply
pub const TOOL_FENCE: &str = "```tool";

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    #[serde(alias = "tool")]
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Call ID correlating the request with its result
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Extract a tool request from model output.
    ///
    /// Looks for a fenced ```` ```tool ```` block first, then falls back to a
    /// bare JSON object carrying a `"tool"` key. A call ID is generated when the
    /// model did not supply one.
    pub fn parse(content: &str) -> Option<Self> {
        let mut call = Self::parse_fenced(content).or_else(|| Self::parse_inline(content))?;
        if call.id.is_none() {
            call.id = Some(uuid::Uuid::new_v4().to_string());
        }
        Some(call)
    }

    fn parse_fenced(content: &str) -> Option<Self> {
        let start_idx = content.find(TOOL_FENCE)?;
        let after_marker = &content[start_idx + TOOL_FENCE.len()..];
        let end_idx = after_marker.find("```")?;
        serde_json::from_str(after_marker[..end_idx].trim()).ok()
    }

    fn parse_inline(content: &str) -> Option<Self> {
        if !content.contains(r#""tool""#) {
            return None;
        }

        let start = content.find('{')?;
        let end = content.rfind('}')?;
        if end <= start {
            return None;
        }

        serde_json::from_str(&content[start..=end]).ok()
    }
}

/// Result of resolving a tool call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success payload or error description)
    pub output: String,
}

impl ToolOutcome {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }

    /// Text injected into the conversation as the tool-result message
    pub fn summary(&self) -> String {
        if self.success {
            format!("[Tool '{}' returned]\n{}", self.name, self.output)
        } else {
            format!("[Tool '{}' failed]\n{}", self.name, self.output)
        }
    }
}

/// Accepted JSON type of a tool parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Whether `value` is acceptable for this type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON type the argument must have
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// Regular expression a string argument must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl ParameterSchema {
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
            pattern: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    fn check(&self, value: &Value) -> Result<()> {
        if !self.param_type.accepts(value) {
            return Err(AgentError::ToolValidation(format!(
                "Parameter '{}' must be of type {}",
                self.name, self.param_type
            )));
        }
        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(AgentError::ToolValidation(format!(
                    "Parameter '{}' must be one of {}",
                    self.name,
                    Value::Array(allowed.clone())
                )));
            }
        }
        if let (Some(pattern), Some(text)) = (&self.pattern, value.as_str()) {
            let re = Regex::new(pattern).map_err(|e| {
                AgentError::ToolValidation(format!(
                    "Parameter '{}' has an invalid pattern: {e}",
                    self.name
                ))
            })?;
            if !re.is_match(text) {
                return Err(AgentError::ToolValidation(format!(
                    "Parameter '{}' must match pattern {pattern}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Tool definition schema (shown to the LLM and used for validation)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Check arguments against the parameter list and fill in defaults.
    ///
    /// Unknown argument names are rejected so a typo surfaces to the model
    /// instead of being silently dropped.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<Map<String, Value>> {
        if let Some(unknown) = arguments
            .keys()
            .find(|key| !self.parameters.iter().any(|p| &p.name == *key))
        {
            return Err(AgentError::ToolValidation(format!(
                "Unknown parameter: {unknown}"
            )));
        }

        let mut normalized = arguments.clone();
        for param in &self.parameters {
            match arguments.get(&param.name) {
                Some(value) => param.check(value)?,
                None => match &param.default {
                    Some(default) => {
                        normalized.insert(param.name.clone(), default.clone());
                    }
                    None if param.required => {
                        return Err(AgentError::ToolValidation(format!(
                            "Missing required parameter: {}",
                            param.name
                        )));
                    }
                    None => {}
                },
            }
        }

        Ok(normalized)
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for prompt generation and validation
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with already-validated arguments
    async fn execute(&self, call: &ToolCall) -> Result<String>;

    /// Validate arguments before execution, returning them with defaults applied
    fn validate(&self, call: &ToolCall) -> Result<Map<String, Value>> {
        self.schema().validate(&call.arguments)
    }
}

/// Registry for available tools, kept in registration order
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a shared tool.
    ///
    /// A name that is already present is overwritten in place: the new
    /// definition keeps the original registration slot.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        if let Some(&slot) = self.index.get(&name) {
            tracing::warn!(tool = %name, "Overwriting previously registered tool");
            self.tools[slot] = tool;
        } else {
            tracing::debug!(tool = %name, "Registering tool");
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.tools[slot]))
    }

    /// Run a tool call, converting every failure into a failed outcome
    pub async fn resolve(&self, call: &ToolCall) -> ToolOutcome {
        let outcome = match self.get(&call.name) {
            None => {
                tracing::warn!(tool = %call.name, "Model requested unknown tool");
                ToolOutcome::failure(
                    &call.name,
                    format!(
                        "Unknown tool '{}'. Available tools: {}",
                        call.name,
                        self.names().join(", ")
                    ),
                )
            }
            Some(tool) => Self::invoke(tool.as_ref(), call).await,
        };
        outcome.with_id(call.id.clone())
    }

    async fn invoke(tool: &dyn Tool, call: &ToolCall) -> ToolOutcome {
        let arguments = match tool.validate(call) {
            Ok(arguments) => arguments,
            Err(e) => return ToolOutcome::failure(&call.name, e.to_string()),
        };
        let validated = ToolCall {
            arguments,
            ..call.clone()
        };

        tracing::debug!(tool = %call.name, id = ?call.id, "Executing tool");
        match AssertUnwindSafe(tool.execute(&validated)).catch_unwind().await {
            Ok(Ok(output)) => ToolOutcome::success(&call.name, output),
            Ok(Err(e)) => ToolOutcome::failure(&call.name, e.to_string()),
            Err(_) => {
                tracing::error!(tool = %call.name, "Tool panicked during execution");
                ToolOutcome::failure(&call.name, "Tool execution error: tool panicked")
            }
        }
    }

    /// Get all tool schemas, in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Get tool names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.schema().name).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate system prompt section describing available tools
    pub fn describe_all(&self) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        if self.is_empty() {
            prompt.push_str("No tools are available in this conversation.\n");
            return prompt;
        }

        prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
        prompt.push_str(TOOL_FENCE);
        prompt.push_str("\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n");

        for schema in self.schemas() {
            prompt.push_str(&format!("### {}\n", schema.name));
            prompt.push_str(&format!("{}\n", schema.description));

            if !schema.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &schema.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}",
                        param.name, param.param_type, required, param.description
                    ));
                    if let Some(values) = &param.enum_values {
                        prompt.push_str(&format!(" One of: {}.", Value::Array(values.clone())));
                    }
                    if let Some(pattern) = &param.pattern {
                        prompt.push_str(&format!(" Pattern: `{pattern}`."));
                    }
                    if let Some(default) = &param.default {
                        prompt.push_str(&format!(" Default: {default}."));
                    }
                    prompt.push('\n');
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Echo tool - returns its input unchanged
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Repeat the given text back verbatim".into(),
            parameters: vec![ParameterSchema::required(
                "text",
                ParamType::String,
                "Text to repeat",
            )],
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<String> {
        call.arguments
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| AgentError::ToolValidation("Missing text".into()))
    }
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time (UTC)".into(),
            parameters: vec![
                ParameterSchema::optional(
                    "format",
                    ParamType::String,
                    "Output format: 'iso', 'human', or 'unix'",
                )
                .with_default(serde_json::json!("human"))
                .with_enum(vec![
                    serde_json::json!("iso"),
                    serde_json::json!("human"),
                    serde_json::json!("unix"),
                ]),
            ],
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<String> {
        let format = call
            .arguments
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("human");

        let now = chrono::Utc::now();

        Ok(match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        })
    }
}
