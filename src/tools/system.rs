// Toolgate - System Tools
//
// system_info, system_command, system_package. Commands run under a
// hard deadline; an expired child is killed, and the timeout surfaces
// as its own error kind, distinct from ordinary command failure.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::security::AccessPolicy;
use crate::tools::{ok, run_with_timeout};
use serde_json::{json, Value};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// Environment variables safe to report from system_info. The full
/// environment is a disclosure risk (API keys, tokens), so only this
/// vetted set is exposed.
const REPORTED_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "SHELL", "LANG", "TERM"];

pub struct SystemTools {
    config: Arc<ServerConfig>,
    policy: Arc<AccessPolicy>,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "system_info",
            "Get system information",
            json!({}),
            &[],
        ),
        ToolDescriptor::new(
            "system_command",
            "Execute a system command",
            json!({
                "command": {"type": "string", "description": "Command to execute"},
                "timeout": {"type": "integer", "description": "Command timeout in seconds", "default": 30}
            }),
            &["command"],
        ),
        ToolDescriptor::new(
            "system_package",
            "Install a package with the system package manager",
            json!({
                "package": {"type": "string", "description": "Package name to install"}
            }),
            &["package"],
        ),
    ]
}

impl SystemTools {
    pub fn new(config: Arc<ServerConfig>, policy: Arc<AccessPolicy>) -> Self {
        Self { config, policy }
    }

    fn system_info(&self) -> Result<Value, ToolError> {
        let mut env = serde_json::Map::new();
        for key in REPORTED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                env.insert(key.to_string(), Value::String(val));
            }
        }
        Ok(ok(json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "family": std::env::consts::FAMILY,
            "current_working_directory": std::env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            "server": &self.config.server_name,
            "server_version": &self.config.server_version,
            "environment_variables": env,
        })))
    }

    fn execute_command(&self, args: &Value) -> Result<Value, ToolError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid("missing required argument: command"))?;
        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.config.tools.command_timeout_secs);

        if !self.policy.is_command_safe(command) {
            return Err(ToolError::failed(format!(
                "Command blocked by security policy: {}",
                command
            )));
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.config.base_path);
        let out = run_with_timeout(
            cmd,
            Duration::from_secs(timeout),
            self.config.tools.max_output_size,
        )?;

        Ok(ok(json!({
            "command": command,
            "return_code": out.return_code,
            "stdout": out.stdout,
            "stderr": out.stderr,
        })))
    }

    fn install_package(&self, args: &Value) -> Result<Value, ToolError> {
        let package = args
            .get("package")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid("missing required argument: package"))?;

        // package name feeds a shell-free argv, but still classify it
        if !self.policy.is_command_safe(package) {
            return Err(ToolError::failed(format!(
                "Package name blocked by security policy: {}",
                package
            )));
        }

        let mut cmd = Command::new("pip");
        cmd.arg("install").arg(package);
        let out = run_with_timeout(
            cmd,
            Duration::from_secs(self.config.tools.package_timeout_secs),
            self.config.tools.max_output_size,
        )?;

        let mut result = ok(json!({
            "package": package,
            "return_code": out.return_code,
            "stdout": out.stdout,
            "stderr": out.stderr,
        }));
        result["success"] = Value::Bool(out.return_code == Some(0));
        Ok(result)
    }
}

impl ToolHandler for SystemTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "system_info" => self.system_info(),
            "system_command" => self.execute_command(args),
            "system_package" => self.install_package(args),
            _ => Err(ToolError::invalid(format!("unknown system tool: {}", tool))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn tools() -> SystemTools {
        SystemTools::new(
            Arc::new(ServerConfig::default()),
            Arc::new(AccessPolicy::new(&SecurityConfig::default())),
        )
    }

    #[test]
    fn info_reports_only_vetted_env() {
        let out = tools().call("system_info", &json!({})).unwrap();
        assert_eq!(out["success"], true);
        let env = out["environment_variables"].as_object().unwrap();
        for key in env.keys() {
            assert!(REPORTED_ENV_VARS.contains(&key.as_str()));
        }
    }

    #[test]
    fn command_runs_and_captures_output() {
        let out = tools()
            .call("system_command", &json!({ "command": "echo toolgate" }))
            .unwrap();
        assert_eq!(out["return_code"], 0);
        assert_eq!(out["stdout"].as_str().unwrap().trim(), "toolgate");
    }

    #[test]
    fn dangerous_command_blocked_before_execution() {
        let err = tools()
            .call("system_command", &json!({ "command": "sudo rm -rf /" }))
            .unwrap_err();
        assert!(err.to_string().contains("blocked by security policy"));
    }

    #[test]
    fn timeout_kills_and_is_distinct() {
        let err = tools()
            .call("system_command", &json!({ "command": "sleep 30", "timeout": 1 }))
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)));
    }

    #[test]
    fn missing_command_is_invalid_params() {
        let err = tools().call("system_command", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
