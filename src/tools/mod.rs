//! Tool handlers exposed over MCP
//!
//! Each handler obtains its client through [`ConnectionManager`] and issues
//! one Redis operation. Driver failures never escape a handler: they become
//! a [`ToolResult`] flagged as an error. Only unknown tool names and
//! malformed arguments are reported as [`ToolError`].

pub mod connection_management;
pub mod keys;
pub mod server_management;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::pool::ConnectionManager;

/// Tool metadata advertised by `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

impl ToolDef {
    pub fn new(name: &'static str, description: &'static str, input_schema: Value) -> Self {
        Self {
            name,
            description,
            input_schema,
        }
    }
}

/// Output of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub value: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    pub fn message<S: Into<String>>(text: S) -> Self {
        Self::ok(Value::String(text.into()))
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            value: Value::String(text.into()),
            is_error: true,
        }
    }

    /// Error reported as an `{"error": ...}` object
    pub fn error_object<S: Into<String>>(text: S) -> Self {
        Self {
            value: json!({ "error": text.into() }),
            is_error: true,
        }
    }

    /// Text content sent back to the client: strings as-is, everything else as JSON
    pub fn to_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// Schema property for the optional `host_id` argument
pub(crate) fn host_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Redis host identifier. Uses the default connection when omitted."
    })
}

/// Deserialize tool arguments; a missing argument object counts as empty
pub(crate) fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| ToolError::invalid_arguments(tool, e.to_string()))
}

/// Dispatches tool calls to their handlers
#[derive(Clone)]
pub struct ToolRegistry {
    manager: ConnectionManager,
}

impl ToolRegistry {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs = connection_management::definitions();
        defs.extend(keys::definitions());
        defs.extend(server_management::definitions());
        defs
    }

    pub async fn call(&self, name: &str, args: &Value) -> Result<ToolResult, ToolError> {
        let manager = &self.manager;
        let result = match name {
            "connect" => connection_management::connect(manager, parse_args(name, args)?).await,
            "list_connections" => connection_management::list_connections(manager).await,
            "disconnect" => connection_management::disconnect(manager, parse_args(name, args)?).await,
            "switch_default_connection" => {
                connection_management::switch_default_connection(manager, parse_args(name, args)?)
                    .await
            }
            "delete" => keys::delete(manager, parse_args(name, args)?).await,
            "type" => keys::key_type(manager, parse_args(name, args)?).await,
            "expire" => keys::expire(manager, parse_args(name, args)?).await,
            "rename" => keys::rename(manager, parse_args(name, args)?).await,
            "scan_keys" => keys::scan_keys(manager, parse_args(name, args)?).await,
            "scan_all_keys" => keys::scan_all_keys(manager, parse_args(name, args)?).await,
            "dbsize" => server_management::dbsize(manager, parse_args(name, args)?).await,
            "info" => server_management::info(manager, parse_args(name, args)?).await,
            "client_list" => server_management::client_list(manager, parse_args(name, args)?).await,
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(result)
    }
}
