//! Tool trait and the capability registry.
//!
//! Tools are what give the agent the ability to act in the world: look up
//! the weather, search for books, fetch a trivia question. Each tool declares
//! an [`ArgSchema`]; the [`ToolRegistry`] validates model-supplied arguments
//! against it before any external call is made, then runs the tool through a
//! [`ResilientInvoker`].

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::retry::{InvokeError, ResilientInvoker, RetryPolicy};

/// A request to execute a tool, as decided by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments exactly as the model supplied them
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// A canonical `name(args)` key; argument maps are key-ordered, so two
    /// calls with the same name and arguments always share a signature.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, Value::Object(self.arguments.clone()))
    }
}

/// The primitive types a tool parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamType {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    /// Coerce a model-supplied value into this type.
    ///
    /// Models frequently quote numbers (`"40.7"`) or emit integral floats
    /// (`5.0`); both are accepted. Anything that would lose information is not.
    fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (Self::String, Value::String(_)) => Some(value.clone()),
            (Self::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Self::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (Self::Number, Value::Number(n)) => n.as_f64().map(Value::from),
            (Self::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),

            (Self::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(Value::from),
            (Self::Integer, Value::String(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
                    .map(Value::from)
            }

            (Self::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Self::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(Value::Bool(true)),
                "false" | "no" => Some(Value::Bool(false)),
                _ => None,
            },

            _ => None,
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type())
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub description: String,
    /// Value used when an optional parameter is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// The declared argument schema of a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgSchema {
    params: Vec<ParamSpec>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter.
    pub fn required(mut self, name: &str, ty: ParamType, description: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            required: true,
            description: description.to_string(),
            default: None,
        });
        self
    }

    /// Declare an optional parameter, with the value to use when omitted.
    pub fn optional(
        mut self,
        name: &str,
        ty: ParamType,
        description: &str,
        default: Option<Value>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            required: false,
            description: description.to_string(),
            default,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// JSON Schema rendering, for tool listings.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = serde_json::json!({
                "type": p.ty.json_type(),
                "description": p.description,
            });
            if let Some(default) = &p.default {
                prop["default"] = default.clone();
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Compact form used in prompts: `latitude: number, limit?: integer`.
    pub fn render_params(&self) -> String {
        self.params
            .iter()
            .map(|p| {
                let marker = if p.required { "" } else { "?" };
                format!("{}{marker}: {}", p.name, p.ty)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Check `arguments` against the schema and produce typed arguments.
    ///
    /// Required parameters must be present and non-null; every present value
    /// must coerce to its declared type. Undeclared arguments are dropped.
    pub fn validate(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ToolArgs, ToolError> {
        let mut values = Map::new();

        for p in &self.params {
            match arguments.get(&p.name).filter(|v| !v.is_null()) {
                Some(raw) => {
                    let coerced = p.ty.coerce(raw).ok_or_else(|| {
                        ToolError::invalid(
                            tool_name,
                            format!("parameter '{}' must be a {}, got {raw}", p.name, p.ty),
                        )
                    })?;
                    values.insert(p.name.clone(), coerced);
                }
                None if p.required => {
                    return Err(ToolError::invalid(
                        tool_name,
                        format!("missing required parameter '{}'", p.name),
                    ));
                }
                None => {
                    if let Some(default) = &p.default {
                        values.insert(p.name.clone(), default.clone());
                    }
                }
            }
        }

        for key in arguments.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                debug!(tool = tool_name, argument = %key, "Dropping undeclared argument");
            }
        }

        Ok(ToolArgs {
            tool_name: tool_name.to_string(),
            values,
        })
    }
}

/// Arguments that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArgs {
    tool_name: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, ToolError> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.missing(name))
    }

    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    fn missing(&self, name: &str) -> ToolError {
        ToolError::invalid(&self.tool_name, format!("missing parameter '{name}'"))
    }
}

/// The core Tool trait.
///
/// Each capability (weather, geocoding, books, ...) implements this trait and
/// is registered once at startup.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> &str;

    /// The arguments this tool accepts.
    fn schema(&self) -> ArgSchema;

    /// Execute the tool with validated arguments.
    async fn execute(&self, args: &ToolArgs) -> Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for listings.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }

    /// `name(param: type, ...)`, as rendered in the system prompt.
    fn signature(&self) -> String {
        format!("{}({})", self.name(), self.schema().render_params())
    }
}

/// A read-only registry of available tools.
///
/// Built once at startup and shared across invocations. The agent loop uses it to:
/// 1. Render the tool list for the model
/// 2. Validate and dispatch tool calls the model requests
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    invoker: ResilientInvoker,
}

impl ToolRegistry {
    /// An empty registry dispatching with the default network retry policy.
    pub fn new() -> Self {
        Self::with_invoker(ResilientInvoker::new(RetryPolicy::network()))
    }

    pub fn with_invoker(invoker: ResilientInvoker) -> Self {
        Self {
            tools: HashMap::new(),
            invoker: invoker.named("tool dispatch"),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// All tools, sorted by name.
    pub fn tools(&self) -> Vec<&dyn Tool> {
        let mut tools: Vec<&dyn Tool> = self.tools.values().map(|t| t.as_ref()).collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools().into_iter().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and execute a tool call.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        self.dispatch_until(call, &CancellationToken::new()).await
    }

    /// Validate and execute a tool call, aborting if `cancel` fires.
    ///
    /// Unknown names and invalid arguments fail before the tool runs.
    /// Retryable failures are retried per the registry's policy; if they
    /// persist the last one is reported as [`ToolError::RetriesExhausted`].
    pub async fn dispatch_until(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<Value, ToolError> {
        let tool = self.resolve(&call.name)?;
        let args = tool.schema().validate(tool.name(), &call.arguments)?;

        debug!(tool = %call.name, args = ?args.as_map(), "Dispatching tool");
        let args = &args;
        match self
            .invoker
            .invoke_until(cancel, || tool.execute(args))
            .await
        {
            Ok(value) => Ok(value),
            Err(InvokeError::Fatal { error, .. }) => Err(error),
            Err(InvokeError::Exhausted { error, attempts }) => Err(ToolError::RetriesExhausted {
                tool_name: call.name.clone(),
                attempts,
                reason: error.to_string(),
            }),
            Err(InvokeError::Cancelled { .. }) => Err(ToolError::Cancelled),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
