// Toolgate - MCP Server
//
// Newline-delimited JSON-RPC 2.0 over stdio. One request in, at most
// one response out; notifications get none. A malformed line answers
// with an internal error and the loop keeps reading — a bad client
// never takes the server down.

use crate::config::{ServerConfig, PROTOCOL_VERSION};
use crate::dispatch::{Dispatcher, CODE_INTERNAL_ERROR, CODE_METHOD_NOT_FOUND};
use crate::metrics::MetricsRecorder;
use crate::ratelimit::RateLimiter;
use crate::registry::ToolRegistry;
use crate::security::AccessPolicy;
use crate::tools;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct McpServer {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
}

impl McpServer {
    /// Wire up the full pipeline: policy, limiter, recorder, registry,
    /// dispatcher. Fails if a built-in tool registers twice or an HTTP
    /// client cannot be built.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let policy = Arc::new(AccessPolicy::new(&config.security));
        let limiter = Arc::new(RateLimiter::new(config.security.max_requests_per_minute));
        let metrics = Arc::new(MetricsRecorder::new());

        let mut registry = ToolRegistry::new();
        tools::register_builtin(&mut registry, &config, &policy)?;

        let dispatcher = Dispatcher::new(policy, limiter, metrics, Arc::new(registry));
        Ok(Self { config, dispatcher })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn metrics_path(&self) -> PathBuf {
        let path = Path::new(&self.config.metrics.metrics_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config.base_path).join(path)
        }
    }

    fn load_metrics_snapshot(&self) {
        if !self.config.metrics.enabled {
            return;
        }
        let path = self.metrics_path();
        if !path.exists() {
            return;
        }
        match std::fs::File::open(&path) {
            Ok(file) => match self.dispatcher.metrics().import(file) {
                Ok(()) => log::info!("Restored metrics snapshot from {:?}", path),
                Err(e) => log::warn!("Could not restore metrics snapshot: {}", e),
            },
            Err(e) => log::warn!("Could not open metrics snapshot {:?}: {}", path, e),
        }
    }

    fn save_metrics_snapshot(&self) {
        if !self.config.metrics.enabled {
            return;
        }
        let path = self.metrics_path();
        match std::fs::File::create(&path) {
            Ok(file) => match self.dispatcher.metrics().export(file) {
                Ok(()) => log::info!("Saved metrics snapshot to {:?}", path),
                Err(e) => log::warn!("Could not save metrics snapshot: {}", e),
            },
            Err(e) => log::warn!("Could not create metrics snapshot {:?}: {}", path, e),
        }
    }

    /// Handle one decoded JSON-RPC message. Returns None for
    /// notifications (no id) and for notification methods.
    pub fn handle_message(&self, msg: &Value) -> Option<Value> {
        let id = msg.get("id").cloned();
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = msg.get("params").cloned().unwrap_or(Value::Null);

        log::debug!("request: method={}", method);

        match method {
            "initialize" => Some(response_ok(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {
                        "tools": {},
                        "resources": {"read": true, "write": true, "list": true}
                    },
                    "serverInfo": {
                        "name": &self.config.server_name,
                        "version": &self.config.server_version,
                    }
                }),
            )),
            "notifications/initialized" => None,
            "ping" => Some(response_ok(id, json!({}))),
            "tools/list" => Some(response_ok(
                id,
                json!({ "tools": self.dispatcher.list_tools() }),
            )),
            "tools/call" => {
                let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let default_args = json!({});
                let args = params.get("arguments").unwrap_or(&default_args);

                match self.dispatcher.call_tool(name, args) {
                    Ok(result) => {
                        let text = serde_json::to_string_pretty(&result)
                            .unwrap_or_else(|_| result.to_string());
                        Some(response_ok(
                            id,
                            json!({
                                "content": [{"type": "text", "text": text}]
                            }),
                        ))
                    }
                    Err(err) => Some(response_err(id, err.code(), &err.to_string())),
                }
            }
            other => {
                // unknown notification: stay silent
                if id.is_none() || id == Some(Value::Null) {
                    return None;
                }
                Some(response_err(
                    id,
                    CODE_METHOD_NOT_FOUND,
                    &format!("Method not found: {}", other),
                ))
            }
        }
    }

    /// Handle one raw input line. A line that does not parse answers
    /// with an internal error instead of ending the session.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        match serde_json::from_str::<Value>(line) {
            Ok(msg) => self.handle_message(&msg),
            Err(e) => {
                log::warn!("unparseable request line: {}", e);
                Some(response_err(
                    Some(Value::Null),
                    CODE_INTERNAL_ERROR,
                    &format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Serve stdio until EOF, one JSON-RPC message per line.
    pub fn run(&self) -> anyhow::Result<()> {
        log::info!(
            "{} v{} listening on stdio",
            self.config.server_name,
            self.config.server_version
        );
        self.load_metrics_snapshot();

        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line) {
                serde_json::to_writer(&mut out, &response)?;
                out.write_all(b"\n")?;
                out.flush()?;
            }
        }

        self.save_metrics_snapshot();
        log::info!("stdin closed, shutting down");
        Ok(())
    }
}

fn response_ok(id: Option<Value>, result: Value) -> Value {
    let mut response = json!({ "jsonrpc": "2.0", "result": result });
    if let Some(id) = id {
        response["id"] = id;
    }
    response
}

fn response_err(id: Option<Value>, code: i64, message: &str) -> Value {
    let mut response = json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message }
    });
    if let Some(id) = id {
        response["id"] = id;
    }
    response
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.base_path = dir.path().to_string_lossy().to_string();
        let server = McpServer::new(config).unwrap();
        (dir, server)
    }

    #[test]
    fn initialize_reports_protocol_and_server_info() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" }))
            .unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "toolgate");
    }

    #[test]
    fn initialized_notification_gets_no_response() {
        let (_dir, s) = server();
        assert!(s
            .handle_message(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .is_none());
    }

    #[test]
    fn tools_list_exposes_all_builtins() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }))
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 22);
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[test]
    fn tools_call_wraps_result_in_text_content() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": { "name": "system_info", "arguments": {} }
            }))
            .unwrap();
        assert_eq!(response["id"], 3);
        let content = &response["result"]["content"][0];
        assert_eq!(content["type"], "text");
        let payload: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(payload["success"], true);
    }

    #[test]
    fn failed_tool_call_is_internal_error() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": { "name": "file_read", "arguments": {} }
            }))
            .unwrap();
        assert_eq!(response["error"]["code"], CODE_INTERNAL_ERROR);
    }

    #[test]
    fn unknown_tool_is_method_not_found() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": { "name": "no_such_tool", "arguments": {} }
            }))
            .unwrap();
        assert_eq!(response["error"]["code"], CODE_METHOD_NOT_FOUND);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Unknown tool"));
    }

    #[test]
    fn unknown_method_with_id_is_method_not_found() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({ "jsonrpc": "2.0", "id": 6, "method": "resources/list" }))
            .unwrap();
        assert_eq!(response["error"]["code"], CODE_METHOD_NOT_FOUND);
        assert_eq!(
            response["error"]["message"],
            "Method not found: resources/list"
        );
    }

    #[test]
    fn unknown_method_without_id_is_silent() {
        let (_dir, s) = server();
        assert!(s
            .handle_message(&json!({ "jsonrpc": "2.0", "method": "mystery/thing" }))
            .is_none());
    }

    #[test]
    fn request_without_id_gets_response_without_id() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({ "jsonrpc": "2.0", "method": "ping" }))
            .unwrap();
        assert!(response.get("id").is_none());

        let response = s
            .handle_message(&json!({
                "jsonrpc": "2.0",
                "method": "tools/call",
                "params": { "name": "code_format", "arguments": { "code": "x" } }
            }))
            .unwrap();
        assert!(response.get("id").is_none());
        assert!(response.get("result").is_some());
    }

    #[test]
    fn malformed_line_answers_and_session_survives() {
        let (_dir, s) = server();
        let response = s.handle_line("{this is not json").unwrap();
        assert_eq!(response["error"]["code"], CODE_INTERNAL_ERROR);
        assert_eq!(response["id"], Value::Null);
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Parse error"));

        // the next well-formed line is still served
        let response = s
            .handle_line(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#)
            .unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"], json!({}));
    }

    #[test]
    fn response_id_echoes_request_id() {
        let (_dir, s) = server();
        let response = s
            .handle_message(&json!({ "jsonrpc": "2.0", "id": "abc-123", "method": "ping" }))
            .unwrap();
        assert_eq!(response["id"], "abc-123");
        assert_eq!(response["result"], json!({}));
    }
}
