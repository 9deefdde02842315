// Toolgate - Built-in Tools
//
// One module per domain prefix. The prefix groups registration only;
// execution is always resolved by the full tool name in the registry.
// Handlers never see the access policy or rate limiter — admission has
// already happened when a handler runs.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolRegistry};
use crate::security::AccessPolicy;
use serde_json::json;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod ai;
pub mod code;
pub mod db;
pub mod file;
pub mod git;
pub mod system;
pub mod web;

/// Register all 22 built-in tools. Duplicate names abort startup.
pub fn register_builtin(
    registry: &mut ToolRegistry,
    config: &Arc<ServerConfig>,
    policy: &Arc<AccessPolicy>,
) -> anyhow::Result<()> {
    let file_tools = Arc::new(file::FileTools::new(Arc::clone(config), Arc::clone(policy)));
    let system_tools = Arc::new(system::SystemTools::new(Arc::clone(config), Arc::clone(policy)));
    let web_tools = Arc::new(web::WebTools::new(Arc::clone(config), Arc::clone(policy))?);
    let code_tools = Arc::new(code::CodeTools::new());
    let git_tools = Arc::new(git::GitTools::new(Arc::clone(config)));
    let db_tools = Arc::new(db::DbTools::new(Arc::clone(config)));
    let ai_tools = Arc::new(ai::AiTools::new(Arc::clone(config))?);

    for descriptor in file::descriptors() {
        registry.register(descriptor, file_tools.clone())?;
    }
    for descriptor in system::descriptors() {
        registry.register(descriptor, system_tools.clone())?;
    }
    for descriptor in web::descriptors() {
        registry.register(descriptor, web_tools.clone())?;
    }
    for descriptor in code::descriptors() {
        registry.register(descriptor, code_tools.clone())?;
    }
    for descriptor in git::descriptors() {
        registry.register(descriptor, git_tools.clone())?;
    }
    for descriptor in db::descriptors() {
        registry.register(descriptor, db_tools.clone())?;
    }
    for descriptor in ai::descriptors() {
        registry.register(descriptor, ai_tools.clone())?;
    }

    log::info!("Registered {} tools", registry.len());
    Ok(())
}

/// Output of a finished (or killed) subprocess
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command with a hard deadline. The child gets its own process
/// group; on expiry the whole group is killed and reaped, so forked
/// grandchildren cannot keep the pipes (and the caller) alive.
pub(crate) fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    max_output: usize,
) -> Result<CommandOutput, ToolError> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = cmd.spawn().map_err(|e| ToolError::failed(format!("spawn failed: {}", e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_thread = std::thread::spawn(move || read_all(stdout));
    let err_thread = std::thread::spawn(move || read_all(stderr));

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    kill_group(&mut child);
                    let _ = child.wait();
                    // every writer is dead now, so the pipes close and
                    // the reader threads finish promptly
                    let _ = out_thread.join();
                    let _ = err_thread.join();
                    return Err(ToolError::Timeout(timeout.as_secs()));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(ToolError::failed(format!("wait failed: {}", e))),
        }
    };

    let stdout = out_thread.join().unwrap_or_default();
    let stderr = err_thread.join().unwrap_or_default();
    Ok(CommandOutput {
        return_code: status.code(),
        stdout: truncate_output(stdout, max_output),
        stderr: truncate_output(stderr, max_output),
    })
}

/// Kill the child's whole process group, then the child itself
fn kill_group(child: &mut std::process::Child) {
    #[cfg(unix)]
    unsafe {
        libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
    }
    let _ = child.kill();
}

fn read_all(pipe: Option<impl Read>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn truncate_output(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("\n… [output truncated]");
    }
    s
}

/// Shared success envelope helper
pub(crate) fn ok(fields: serde_json::Value) -> serde_json::Value {
    let mut out = json!({ "success": true });
    if let (Some(dst), Some(src)) = (out.as_object_mut(), fields.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
