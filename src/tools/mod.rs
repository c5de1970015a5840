//! MCP tool implementations.

pub mod claims;
pub mod context;
pub mod tasks;

pub use context::ToolContext;

use crate::coord::Coordinator;
use crate::error::ToolError;
use crate::types::AgentContext;
use anyhow::Result;
use rmcp::model::Tool;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// Result of a tool call: text for the agent, JSON for programs.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Value,
}

impl ToolOutput {
    pub fn new<T: Serialize>(text: String, payload: &T) -> Result<Self> {
        Ok(Self {
            text,
            structured: serde_json::to_value(payload)?,
        })
    }
}

/// Tool handler that processes MCP tool calls for one agent identity.
pub struct ToolHandler {
    pub coordinator: Coordinator,
    pub agent: AgentContext,
}

impl ToolHandler {
    pub fn new(coordinator: Coordinator, agent: AgentContext) -> Self {
        Self { coordinator, agent }
    }

    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = tasks::get_tools();
        tools.extend(claims::get_tools());
        tools
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let coord = &self.coordinator;
        let agent = &self.agent;

        match name {
            "create_task" => tasks::create_task(coord, agent, ctx, arguments),
            "list_tasks" => tasks::list_tasks(coord, agent, arguments),
            "pick_task" => tasks::pick_task(coord, agent, ctx, arguments),
            "update_task" => tasks::update_task(coord, agent, ctx, arguments),
            "create_subtasks" => tasks::create_subtasks(coord, agent, arguments),
            "list_available" => tasks::list_available(coord, agent, arguments),

            "claim" => claims::claim(coord, agent, ctx, arguments),
            "unclaim" => claims::unclaim(coord, agent),
            "end_session" => claims::end_session(coord, agent, arguments),
            "list_claims" => claims::list_claims(coord, agent, arguments),

            _ => Err(ToolError::unknown_tool(name).into()),
        }
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Non-empty string argument.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// String array argument. A single string counts as a one-element array.
pub fn get_string_array(args: &Value, key: &str) -> Option<Vec<String>> {
    match args.get(key)? {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(arr) => Some(
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
        ),
        _ => None,
    }
}

pub fn require_string(args: &Value, key: &str) -> Result<String> {
    get_string(args, key).ok_or_else(|| ToolError::missing_field(key).into())
}

/// Parse an optional string argument into an enum.
pub fn get_parsed<T>(args: &Value, key: &str) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    match get_string(args, key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ToolError::invalid_value(key, e).into()),
        None => Ok(None),
    }
}
