// Toolgate - File Tools
//
// file_read, file_write, file_search, file_list. Every path is
// validated against the configured base directory before any I/O.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::security::AccessPolicy;
use crate::tools::ok;
use regex::Regex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct FileTools {
    config: Arc<ServerConfig>,
    policy: Arc<AccessPolicy>,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "file_read",
            "Read the contents of a file",
            json!({
                "path": {"type": "string", "description": "Path to the file to read"}
            }),
            &["path"],
        ),
        ToolDescriptor::new(
            "file_write",
            "Write content to a file",
            json!({
                "path": {"type": "string", "description": "Path to the file to write"},
                "content": {"type": "string", "description": "Content to write to the file"}
            }),
            &["path", "content"],
        ),
        ToolDescriptor::new(
            "file_search",
            "Search for files matching a pattern",
            json!({
                "pattern": {"type": "string", "description": "File pattern to search for (e.g., *.py)"},
                "recursive": {"type": "boolean", "description": "Search recursively in subdirectories", "default": true},
                "file_types": {"type": "array", "items": {"type": "string"}, "description": "File extensions to include"}
            }),
            &["pattern"],
        ),
        ToolDescriptor::new(
            "file_list",
            "List files and directories in a path",
            json!({
                "path": {"type": "string", "description": "Path to list (default: current directory)", "default": "."},
                "show_hidden": {"type": "boolean", "description": "Show hidden files", "default": false}
            }),
            &[],
        ),
    ]
}

impl FileTools {
    pub fn new(config: Arc<ServerConfig>, policy: Arc<AccessPolicy>) -> Self {
        Self { config, policy }
    }

    fn checked_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        if !self.policy.validate_file_path(path, &self.config.base_path) {
            return Err(ToolError::invalid(format!(
                "path escapes base directory: {}",
                path
            )));
        }
        let p = Path::new(path);
        if p.is_absolute() {
            Ok(p.to_path_buf())
        } else {
            Ok(Path::new(&self.config.base_path).join(p))
        }
    }

    fn read_file(&self, args: &Value) -> Result<Value, ToolError> {
        let path = required_str(args, "path")?;
        let full = self.checked_path(path)?;

        let size = std::fs::metadata(&full)?.len();
        if size > self.config.max_file_size_bytes() {
            return Err(ToolError::failed(format!(
                "File too large: {} bytes (max: {})",
                size,
                self.config.max_file_size_bytes()
            )));
        }

        let content = std::fs::read_to_string(&full)?;
        let checksum = hex::encode(Sha256::digest(content.as_bytes()));
        Ok(ok(json!({
            "path": full.to_string_lossy(),
            "size": content.len(),
            "lines": content.lines().count(),
            "sha256": checksum,
            "content": content,
        })))
    }

    fn write_file(&self, args: &Value) -> Result<Value, ToolError> {
        let path = required_str(args, "path")?;
        let content = required_str(args, "content")?;
        let full = self.checked_path(path)?;

        if content.len() as u64 > self.config.max_file_size_bytes() {
            return Err(ToolError::failed(format!(
                "Content too large: {} bytes (max: {})",
                content.len(),
                self.config.max_file_size_bytes()
            )));
        }

        std::fs::write(&full, content)?;
        Ok(ok(json!({
            "path": full.to_string_lossy(),
            "size": content.len(),
        })))
    }

    fn search_files(&self, args: &Value) -> Result<Value, ToolError> {
        let pattern = required_str(args, "pattern")?;
        let recursive = args.get("recursive").and_then(|v| v.as_bool()).unwrap_or(true);
        let file_types: Vec<String> = args
            .get("file_types")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim_start_matches('.').to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        let matcher = glob_to_regex(pattern)?;
        let base = PathBuf::from(&self.config.base_path);
        let mut matches = Vec::new();
        walk(&base, recursive, &mut |entry| {
            let name = entry.file_name().map(|n| n.to_string_lossy().to_string());
            let Some(name) = name else { return };
            if !matcher.is_match(&name) {
                return;
            }
            if !file_types.is_empty() {
                let ext = entry
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !file_types.contains(&ext) {
                    return;
                }
            }
            matches.push(entry.to_string_lossy().to_string());
        })?;
        matches.sort();

        Ok(ok(json!({
            "pattern": pattern,
            "matches": matches,
            "count": matches.len(),
        })))
    }

    fn list_directory(&self, args: &Value) -> Result<Value, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let show_hidden = args.get("show_hidden").and_then(|v| v.as_bool()).unwrap_or(false);
        let full = self.checked_path(path)?;

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            let meta = entry.metadata()?;
            entries.push(json!({
                "name": name,
                "type": if meta.is_dir() { "directory" } else { "file" },
                "size": meta.len(),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ok(json!({
            "path": full.to_string_lossy(),
            "count": entries.len(),
            "entries": entries,
        })))
    }
}

impl ToolHandler for FileTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "file_read" => self.read_file(args),
            "file_write" => self.write_file(args),
            "file_search" => self.search_files(args),
            "file_list" => self.list_directory(args),
            _ => Err(ToolError::invalid(format!("unknown file tool: {}", tool))),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument: {}", key)))
}

/// Translate a shell-style file glob ("*.py") into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex, ToolError> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| ToolError::invalid(format!("bad pattern: {}", e)))
}

fn walk(
    dir: &Path,
    recursive: bool,
    visit: &mut impl FnMut(&Path),
) -> Result<(), ToolError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                // unreadable subdirectories are skipped, not fatal
                let _ = walk(&path, recursive, visit);
            }
        } else {
            visit(&path);
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
