// Toolgate - Git Tools
//
// git_status, git_commit, git_push, git_pull. Each tool shells out to
// the git binary in argv form against the configured base directory;
// user-supplied text (commit messages, branch names) is never passed
// through a shell.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::tools::{ok, run_with_timeout, CommandOutput};
use serde_json::{json, Value};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

pub struct GitTools {
    config: Arc<ServerConfig>,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "git_status",
            "Show the working tree status of the repository",
            json!({
                "path": {"type": "string", "description": "Repository path (default: base directory)", "default": "."}
            }),
            &[],
        ),
        ToolDescriptor::new(
            "git_commit",
            "Stage all changes and create a commit",
            json!({
                "message": {"type": "string", "description": "Commit message"},
                "path": {"type": "string", "description": "Repository path (default: base directory)", "default": "."}
            }),
            &["message"],
        ),
        ToolDescriptor::new(
            "git_push",
            "Push commits to a remote",
            json!({
                "remote": {"type": "string", "description": "Remote name", "default": "origin"},
                "branch": {"type": "string", "description": "Branch to push (default: current branch)"}
            }),
            &[],
        ),
        ToolDescriptor::new(
            "git_pull",
            "Pull changes from a remote",
            json!({
                "remote": {"type": "string", "description": "Remote name", "default": "origin"},
                "branch": {"type": "string", "description": "Branch to pull (default: current branch)"}
            }),
            &[],
        ),
    ]
}

impl GitTools {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    fn repo_dir(&self, args: &Value) -> String {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        if std::path::Path::new(path).is_absolute() {
            path.to_string()
        } else {
            std::path::Path::new(&self.config.base_path)
                .join(path)
                .to_string_lossy()
                .to_string()
        }
    }

    fn run_git(&self, dir: &str, git_args: &[&str]) -> Result<CommandOutput, ToolError> {
        let mut cmd = Command::new("git");
        cmd.args(git_args).current_dir(dir);
        run_with_timeout(
            cmd,
            Duration::from_secs(self.config.tools.git_timeout_secs),
            self.config.tools.max_output_size,
        )
    }

    fn status(&self, args: &Value) -> Result<Value, ToolError> {
        let dir = self.repo_dir(args);
        let out = self.run_git(&dir, &["status", "--porcelain"])?;
        if out.return_code != Some(0) {
            return Err(ToolError::failed(format!("git status failed: {}", out.stderr.trim())));
        }
        let branch = self.run_git(&dir, &["branch", "--show-current"])?;

        let mut modified = Vec::new();
        let mut untracked = Vec::new();
        let mut staged = Vec::new();
        for line in out.stdout.lines() {
            if line.len() < 4 {
                continue;
            }
            let (code, file) = line.split_at(3);
            let file = file.to_string();
            match &code[..2] {
                "??" => untracked.push(file),
                s if s.starts_with(' ') => modified.push(file),
                _ => staged.push(file),
            }
        }

        Ok(ok(json!({
            "path": dir,
            "branch": branch.stdout.trim(),
            "clean": out.stdout.trim().is_empty(),
            "staged": staged,
            "modified": modified,
            "untracked": untracked,
        })))
    }

    fn commit(&self, args: &Value) -> Result<Value, ToolError> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::invalid("missing required argument: message"))?;
        let dir = self.repo_dir(args);

        let add = self.run_git(&dir, &["add", "-A"])?;
        if add.return_code != Some(0) {
            return Err(ToolError::failed(format!("git add failed: {}", add.stderr.trim())));
        }
        let out = self.run_git(&dir, &["commit", "-m", message])?;
        if out.return_code != Some(0) {
            return Err(ToolError::failed(format!(
                "git commit failed: {}",
                if out.stderr.trim().is_empty() { out.stdout.trim() } else { out.stderr.trim() }
            )));
        }

        Ok(ok(json!({
            "path": dir,
            "message": message,
            "output": out.stdout.trim(),
        })))
    }

    fn push(&self, args: &Value) -> Result<Value, ToolError> {
        let remote = args.get("remote").and_then(|v| v.as_str()).unwrap_or("origin");
        let branch = args.get("branch").and_then(|v| v.as_str());
        let dir = self.repo_dir(args);

        let mut git_args = vec!["push", remote];
        if let Some(branch) = branch {
            git_args.push(branch);
        }
        let out = self.run_git(&dir, &git_args)?;
        if out.return_code != Some(0) {
            return Err(ToolError::failed(format!("git push failed: {}", out.stderr.trim())));
        }

        Ok(ok(json!({
            "remote": remote,
            "branch": branch,
            // git reports push progress on stderr even on success
            "output": if out.stdout.trim().is_empty() { out.stderr.trim() } else { out.stdout.trim() },
        })))
    }

    fn pull(&self, args: &Value) -> Result<Value, ToolError> {
        let remote = args.get("remote").and_then(|v| v.as_str()).unwrap_or("origin");
        let branch = args.get("branch").and_then(|v| v.as_str());
        let dir = self.repo_dir(args);

        let mut git_args = vec!["pull", remote];
        if let Some(branch) = branch {
            git_args.push(branch);
        }
        let out = self.run_git(&dir, &git_args)?;
        if out.return_code != Some(0) {
            return Err(ToolError::failed(format!("git pull failed: {}", out.stderr.trim())));
        }

        Ok(ok(json!({
            "remote": remote,
            "branch": branch,
            "output": out.stdout.trim(),
        })))
    }
}

impl ToolHandler for GitTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "git_status" => self.status(args),
            "git_commit" => self.commit(args),
            "git_push" => self.push(args),
            "git_pull" => self.pull(args),
            _ => Err(ToolError::invalid(format!("unknown git tool: {}", tool))),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn tools_in(dir: &Path) -> GitTools {
        let mut config = ServerConfig::default();
        config.base_path = dir.to_string_lossy().to_string();
        GitTools::new(Arc::new(config))
    }

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir)
                .output()
                .unwrap();
            assert!(status.status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
    }

    #[test]
    fn status_reports_untracked_files() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();

        let out = tools_in(dir.path()).call("git_status", &json!({})).unwrap();
        assert_eq!(out["clean"], false);
        assert_eq!(out["untracked"][0], "new.txt");
    }

    #[test]
    fn commit_stages_and_records_message() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let tools = tools_in(dir.path());
        let out = tools
            .call("git_commit", &json!({ "message": "add a.txt" }))
            .unwrap();
        assert_eq!(out["success"], true);

        let status = tools.call("git_status", &json!({})).unwrap();
        assert_eq!(status["clean"], true);
    }

    #[test]
    fn status_outside_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = tools_in(dir.path()).call("git_status", &json!({})).unwrap_err();
        assert!(err.to_string().contains("git status failed"));
    }

    #[test]
    fn commit_without_message_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let err = tools_in(dir.path()).call("git_commit", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
