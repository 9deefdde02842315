// Toolgate - Tool Registry
//
// Maps tool names to capability handlers. Registration happens once at
// startup (duplicate names are fatal there, never at call time);
// resolution is always exact-name lookup — domain prefixes organize
// registration but never route execution.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors a tool handler may surface. The dispatcher converts these to
/// error envelopes; the message travels on the wire, a backtrace never
/// does.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn failed(msg: impl Into<String>) -> Self {
        ToolError::Failed(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ToolError::InvalidParams(msg.into())
    }
}

/// One tool's behavior. Handlers receive the full tool name plus the
/// JSON arguments and report success or failure by return value only —
/// admission control has already happened by the time a handler runs,
/// and handlers never touch the transport.
pub trait ToolHandler: Send + Sync {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError>;
}

/// Static per-tool metadata; the union of all descriptors is the
/// catalog returned by tools/list.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Build a descriptor with the MCP inputSchema envelope
    pub fn new(name: &str, description: &str, properties: Value, required: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "name": &self.name,
            "description": &self.description,
            "inputSchema": &self.input_schema,
        })
    }
}

/// Name → handler map, read-only after startup
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    /// Catalog in registration order
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            descriptors: Vec::new(),
        }
    }

    /// Register one tool. Duplicate names are a configuration error.
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> anyhow::Result<()> {
        if self.handlers.contains_key(&descriptor.name) {
            anyhow::bail!("duplicate tool registration: {}", descriptor.name);
        }
        self.handlers.insert(descriptor.name.clone(), handler);
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Exact-name lookup. An unknown name, even with a recognized
    /// prefix, is None.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn catalog(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ToolHandler for Echo {
        fn call(&self, _tool: &str, args: &Value) -> Result<Value, ToolError> {
            Ok(json!({ "echoed": args.get("message").cloned().unwrap_or(Value::Null) }))
        }
    }

    fn echo_descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "Echo back the message argument",
            json!({ "message": { "type": "string", "description": "Text to echo" } }),
            &["message"],
        )
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("echo"), Arc::new(Echo)).unwrap();
        let handler = registry.resolve("echo").expect("registered");
        let out = handler.call("echo", &json!({ "message": "hi" })).unwrap();
        assert_eq!(out["echoed"], "hi");
    }

    #[test]
    fn duplicate_registration_is_error() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("echo"), Arc::new(Echo)).unwrap();
        assert!(registry.register(echo_descriptor("echo"), Arc::new(Echo)).is_err());
    }

    #[test]
    fn prefix_never_resolves() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("file_read"), Arc::new(Echo)).unwrap();
        assert!(registry.resolve("file_read").is_some());
        // recognized prefix, unknown name
        assert!(registry.resolve("file_delete").is_none());
        assert!(registry.resolve("file_").is_none());
    }

    #[test]
    fn catalog_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_descriptor("b_tool"), Arc::new(Echo)).unwrap();
        registry.register(echo_descriptor("a_tool"), Arc::new(Echo)).unwrap();
        let names: Vec<&str> = registry.catalog().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["b_tool", "a_tool"]);
    }

    #[test]
    fn descriptor_json_shape() {
        let d = echo_descriptor("echo");
        let v = d.to_json();
        assert_eq!(v["name"], "echo");
        assert_eq!(v["inputSchema"]["type"], "object");
        assert_eq!(v["inputSchema"]["required"][0], "message");
    }
}
