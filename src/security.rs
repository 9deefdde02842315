// Toolgate - Access Policy
//
// Allow-list membership, dangerous-command classification, path
// containment, input sanitization. All checks are pure and read-only
// after construction — safe to share across connections without locks.

use crate::config::SecurityConfig;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::Path;

/// Regex danger patterns checked against lower-cased command text.
/// Catches destructive wipes, privilege escalation, raw device writes.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"rm\s+-rf\s+/",
    r"del\s+/s\s+/q\s+c:\\",
    r"format\s+c:",
    r"sudo\s+",
    r"\bsu\s+",
    r"chmod\s+777",
    r"chown\s+root",
    r">\s*/dev/",
    r">\s*/proc/",
    r"mkfs\s+",
    r"dd\s+if=",
];

/// Static admission policy for tool calls
pub struct AccessPolicy {
    allowed_tools: HashSet<String>,
    blocked_commands: Vec<String>,
    danger_patterns: Vec<Regex>,
}

impl AccessPolicy {
    pub fn new(config: &SecurityConfig) -> Self {
        let danger_patterns = DANGEROUS_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("built-in danger pattern must compile"))
            .collect();
        Self {
            allowed_tools: config.allowed_tools.iter().cloned().collect(),
            blocked_commands: config
                .blocked_commands
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            danger_patterns,
        }
    }

    /// Exact-name membership test against the allow-list
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.allowed_tools.contains(tool_name)
    }

    /// False if the command contains a blocked substring or matches a
    /// danger pattern. Checked on the lower-cased, trimmed text.
    pub fn is_command_safe(&self, command: &str) -> bool {
        let command_lower = command.to_lowercase();
        let command_lower = command_lower.trim();

        if self
            .blocked_commands
            .iter()
            .any(|blocked| command_lower.contains(blocked.as_str()))
        {
            return false;
        }

        !self
            .danger_patterns
            .iter()
            .any(|pattern| pattern.is_match(command_lower))
    }

    /// True iff `path` resolves inside `base_path`
    pub fn validate_file_path(&self, path: &str, base_path: &str) -> bool {
        let base = match std::fs::canonicalize(base_path) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let full = resolve_within(Path::new(path), &base);
        match full {
            Some(p) => p.starts_with(&base),
            None => false,
        }
    }

    /// Strip null bytes and control characters (newlines and tabs kept)
    pub fn sanitize_input(&self, text: &str) -> String {
        text.chars()
            .filter(|c| *c >= ' ' || *c == '\n' || *c == '\t')
            .collect()
    }

    /// Policy summary for the security-report CLI
    pub fn report(&self) -> Value {
        let mut allowed: Vec<&str> = self.allowed_tools.iter().map(|s| s.as_str()).collect();
        allowed.sort_unstable();
        json!({
            "allowed_tools": allowed,
            "blocked_commands": &self.blocked_commands,
            "danger_patterns": DANGEROUS_PATTERNS,
        })
    }
}

/// Canonicalize `path` (relative paths are joined onto `base` first).
/// Nonexistent files canonicalize through their parent directory.
fn resolve_within(path: &Path, base: &Path) -> Option<std::path::PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    if let Ok(p) = std::fs::canonicalize(&joined) {
        return Some(p);
    }
    let parent = joined.parent()?;
    let file_name = joined.file_name()?;
    if file_name.to_string_lossy().contains("..") {
        return None;
    }
    std::fs::canonicalize(parent).ok().map(|p| p.join(file_name))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;

    fn policy() -> AccessPolicy {
        AccessPolicy::new(&SecurityConfig::default())
    }

    #[test]
    fn builtin_tools_allowed() {
        let p = policy();
        assert!(p.is_tool_allowed("file_read"));
        assert!(p.is_tool_allowed("git_status"));
        assert!(p.is_tool_allowed("ai_generate"));
    }

    #[test]
    fn unknown_tool_denied() {
        let p = policy();
        assert!(!p.is_tool_allowed("nonexistent_tool"));
        assert!(!p.is_tool_allowed("file_delete"));
        assert!(!p.is_tool_allowed(""));
    }

    #[test]
    fn allow_list_is_configuration() {
        let mut config = SecurityConfig::default();
        config.allowed_tools.retain(|t| t != "system_command");
        config.allowed_tools.push("custom_echo".to_string());
        let p = AccessPolicy::new(&config);
        assert!(!p.is_tool_allowed("system_command"));
        assert!(p.is_tool_allowed("custom_echo"));
    }

    #[test]
    fn blocked_substrings_rejected() {
        let p = policy();
        assert!(!p.is_command_safe("rm -rf /"));
        assert!(!p.is_command_safe("sudo apt install foo"));
        assert!(!p.is_command_safe("chmod 777 /etc/passwd"));
        assert!(!p.is_command_safe("  RM -RF /  ")); // case + whitespace insensitive
    }

    #[test]
    fn danger_patterns_rejected() {
        let p = policy();
        assert!(!p.is_command_safe("dd if=/dev/zero of=/dev/sda"));
        assert!(!p.is_command_safe("echo x > /dev/sda"));
        assert!(!p.is_command_safe("mkfs .ext4 /dev/sdb1"));
    }

    #[test]
    fn ordinary_commands_safe() {
        let p = policy();
        assert!(p.is_command_safe("ls -la"));
        assert!(p.is_command_safe("git log --oneline"));
        assert!(p.is_command_safe("cargo build --release"));
    }

    #[test]
    fn substring_match_is_literal() {
        // "su" is a blocked substring, so anything containing it is
        // rejected — the check is deliberately coarse.
        let p = policy();
        assert!(!p.is_command_safe("echo summarize"));
    }

    #[test]
    fn path_containment() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let inside = dir.path().join("notes.txt");
        std::fs::write(&inside, "x").unwrap();
        let p = policy();
        assert!(p.validate_file_path(&inside.to_string_lossy(), &base));
        assert!(p.validate_file_path("notes.txt", &base));
        assert!(!p.validate_file_path("/etc/passwd", &base));
        assert!(!p.validate_file_path("../outside.txt", &base));
    }

    #[test]
    fn sanitize_strips_control_chars() {
        let p = policy();
        assert_eq!(p.sanitize_input("a\x00b\x01c"), "abc");
        assert_eq!(p.sanitize_input("line1\nline2\tend"), "line1\nline2\tend");
    }
}
