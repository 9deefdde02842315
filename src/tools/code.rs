// Toolgate - Code Tools
//
// code_analyze, code_format, code_lint. Heuristic, language-agnostic
// source checks — no external toolchain is invoked.

use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::tools::ok;
use serde_json::{json, Value};

const MAX_LINE_LENGTH: usize = 120;

pub struct CodeTools;

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "code_analyze",
            "Analyze code for issues and suggestions",
            json!({
                "code": {"type": "string", "description": "Source code to analyze"},
                "language": {"type": "string", "description": "Programming language", "default": "python"}
            }),
            &["code"],
        ),
        ToolDescriptor::new(
            "code_format",
            "Format code (trailing whitespace, blank-line runs, final newline)",
            json!({
                "code": {"type": "string", "description": "Source code to format"},
                "language": {"type": "string", "description": "Programming language", "default": "python"}
            }),
            &["code"],
        ),
        ToolDescriptor::new(
            "code_lint",
            "Lint code for style problems",
            json!({
                "code": {"type": "string", "description": "Source code to lint"},
                "language": {"type": "string", "description": "Programming language", "default": "python"}
            }),
            &["code"],
        ),
    ]
}

impl CodeTools {
    pub fn new() -> Self {
        Self
    }

    fn analyze(&self, args: &Value) -> Result<Value, ToolError> {
        let code = required_str(args, "code")?;
        let language = args.get("language").and_then(|v| v.as_str()).unwrap_or("python");

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        for (i, line) in code.lines().enumerate() {
            let line_no = i + 1;
            if line.chars().count() > MAX_LINE_LENGTH {
                suggestions.push(json!({
                    "type": "long_line",
                    "message": format!("Line {} is too long ({} characters)", line_no, line.chars().count()),
                    "line": line_no,
                }));
            }
            if line.contains("TODO") || line.contains("FIXME") {
                issues.push(json!({
                    "type": "todo_comment",
                    "message": format!("TODO/FIXME comment on line {}", line_no),
                    "line": line_no,
                }));
            }
        }

        if let Some(message) = unbalanced_delimiters(code) {
            issues.push(json!({
                "type": "syntax_error",
                "message": message,
                "line": Value::Null,
            }));
        }

        Ok(ok(json!({
            "language": language,
            "lines": code.lines().count(),
            "characters": code.chars().count(),
            "issues": issues,
            "suggestions": suggestions,
        })))
    }

    fn format(&self, args: &Value) -> Result<Value, ToolError> {
        let code = required_str(args, "code")?;
        let language = args.get("language").and_then(|v| v.as_str()).unwrap_or("python");

        let mut formatted_lines: Vec<String> = Vec::new();
        let mut blank_run = 0usize;
        for line in code.lines() {
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                blank_run += 1;
                if blank_run > 2 {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            formatted_lines.push(trimmed.to_string());
        }
        while formatted_lines.last().is_some_and(|l| l.is_empty()) {
            formatted_lines.pop();
        }
        let mut formatted = formatted_lines.join("\n");
        if !formatted.is_empty() {
            formatted.push('\n');
        }

        Ok(ok(json!({
            "language": language,
            "formatted_code": formatted,
        })))
    }

    fn lint(&self, args: &Value) -> Result<Value, ToolError> {
        let code = required_str(args, "code")?;
        let language = args.get("language").and_then(|v| v.as_str()).unwrap_or("python");

        let mut issues = Vec::new();
        for (i, line) in code.lines().enumerate() {
            let line_no = i + 1;
            if line != line.trim_end() {
                issues.push(json!({
                    "type": "trailing_whitespace",
                    "message": format!("Trailing whitespace on line {}", line_no),
                    "line": line_no,
                }));
            }
            let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
            if indent.contains(' ') && indent.contains('\t') {
                issues.push(json!({
                    "type": "mixed_indentation",
                    "message": format!("Mixed tabs and spaces on line {}", line_no),
                    "line": line_no,
                }));
            }
            if line.chars().count() > MAX_LINE_LENGTH {
                issues.push(json!({
                    "type": "long_line",
                    "message": format!("Line {} exceeds {} characters", line_no, MAX_LINE_LENGTH),
                    "line": line_no,
                }));
            }
        }

        Ok(ok(json!({
            "language": language,
            "issues": issues,
            "issue_count": issues.len(),
        })))
    }
}

impl ToolHandler for CodeTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "code_analyze" => self.analyze(args),
            "code_format" => self.format(args),
            "code_lint" => self.lint(args),
            _ => Err(ToolError::invalid(format!("unknown code tool: {}", tool))),
        }
    }
}

impl Default for CodeTools {
    fn default() -> Self {
        Self::new()
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument: {}", key)))
}

/// Cheap delimiter-balance check; string/char literals are not parsed,
/// so this flags only gross structural breakage.
fn unbalanced_delimiters(code: &str) -> Option<String> {
    let mut stack = Vec::new();
    for c in code.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return Some("unbalanced parentheses".to_string());
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return Some("unbalanced brackets".to_string());
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return Some("unbalanced braces".to_string());
                }
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        None
    } else {
        Some(format!("{} unclosed delimiter(s)", stack.len()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_counts_and_flags() {
        let code = "fn main() {\n    // TODO: fix\n}\n";
        let out = CodeTools::new().call("code_analyze", &json!({ "code": code })).unwrap();
        assert_eq!(out["lines"], 3);
        assert_eq!(out["issues"][0]["type"], "todo_comment");
        assert_eq!(out["issues"][0]["line"], 2);
    }

    #[test]
    fn analyze_flags_unbalanced_braces() {
        let out = CodeTools::new()
            .call("code_analyze", &json!({ "code": "fn broken() {" }))
            .unwrap();
        let issues = out["issues"].as_array().unwrap();
        assert!(issues.iter().any(|i| i["type"] == "syntax_error"));
    }

    #[test]
    fn format_normalizes_whitespace() {
        let code = "let x = 1;   \n\n\n\n\nlet y = 2;";
        let out = CodeTools::new().call("code_format", &json!({ "code": code })).unwrap();
        let formatted = out["formatted_code"].as_str().unwrap();
        assert_eq!(formatted, "let x = 1;\n\n\nlet y = 2;\n");
    }

    #[test]
    fn lint_reports_trailing_whitespace() {
        let out = CodeTools::new()
            .call("code_lint", &json!({ "code": "clean line\ndirty line   " }))
            .unwrap();
        assert_eq!(out["issue_count"], 1);
        assert_eq!(out["issues"][0]["line"], 2);
    }

    #[test]
    fn missing_code_is_invalid_params() {
        let err = CodeTools::new().call("code_lint", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
