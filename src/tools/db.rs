// Toolgate - Database Tools
//
// db_query, db_execute against the configured SQLite database. A
// fresh connection is opened per call; SQLite serializes writers
// itself, so the handler stays lock-free.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::tools::ok;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct DbTools {
    config: Arc<ServerConfig>,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "db_query",
            "Run a read query and return the matching rows",
            json!({
                "query": {"type": "string", "description": "SQL query to execute"},
                "params": {"type": "array", "items": {"type": "string"}, "description": "Positional query parameters"}
            }),
            &["query"],
        ),
        ToolDescriptor::new(
            "db_execute",
            "Run a write statement (INSERT/UPDATE/DELETE/DDL)",
            json!({
                "statement": {"type": "string", "description": "SQL statement to execute"},
                "params": {"type": "array", "items": {"type": "string"}, "description": "Positional statement parameters"}
            }),
            &["statement"],
        ),
    ]
}

impl DbTools {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    fn database_path(&self) -> PathBuf {
        let path = Path::new(&self.config.tools.database_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config.base_path).join(path)
        }
    }

    fn open(&self) -> Result<Connection, ToolError> {
        Connection::open(self.database_path())
            .map_err(|e| ToolError::failed(format!("cannot open database: {}", e)))
    }

    fn query(&self, args: &Value) -> Result<Value, ToolError> {
        let sql = required_str(args, "query")?;
        let params = string_params(args);
        let conn = self.open()?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| ToolError::failed(format!("query failed: {}", e)))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(|e| ToolError::failed(format!("query failed: {}", e)))?;
        let mut out_rows = Vec::new();
        loop {
            let row = rows
                .next()
                .map_err(|e| ToolError::failed(format!("query failed: {}", e)))?;
            let Some(row) = row else { break };
            let mut obj = serde_json::Map::new();
            for (i, col) in columns.iter().enumerate() {
                let val = row
                    .get_ref(i)
                    .map_err(|e| ToolError::failed(format!("query failed: {}", e)))?;
                obj.insert(col.clone(), sqlite_value_to_json(val));
            }
            out_rows.push(Value::Object(obj));
        }

        Ok(ok(json!({
            "columns": columns,
            "rows": out_rows,
            "row_count": out_rows.len(),
        })))
    }

    fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let sql = required_str(args, "statement")?;
        let params = string_params(args);
        let conn = self.open()?;

        let affected = conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(|e| ToolError::failed(format!("execute failed: {}", e)))?;

        Ok(ok(json!({
            "affected_rows": affected,
            "last_insert_rowid": conn.last_insert_rowid(),
        })))
    }
}

impl ToolHandler for DbTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "db_query" => self.query(args),
            "db_execute" => self.execute(args),
            _ => Err(ToolError::invalid(format!("unknown db tool: {}", tool))),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument: {}", key)))
}

fn string_params(args: &Value) -> Vec<String> {
    args.get("params")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn sqlite_value_to_json(val: ValueRef<'_>) -> Value {
    match val {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn tools_in(dir: &Path) -> DbTools {
        let mut config = ServerConfig::default();
        config.base_path = dir.to_string_lossy().to_string();
        DbTools::new(Arc::new(config))
    }

    #[test]
    fn execute_then_query_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools_in(dir.path());

        let created = tools
            .call(
                "db_execute",
                &json!({ "statement": "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)" }),
            )
            .unwrap();
        assert_eq!(created["success"], true);

        let inserted = tools
            .call(
                "db_execute",
                &json!({ "statement": "INSERT INTO notes (body) VALUES (?1)", "params": ["hello"] }),
            )
            .unwrap();
        assert_eq!(inserted["affected_rows"], 1);
        assert_eq!(inserted["last_insert_rowid"], 1);

        let rows = tools
            .call("db_query", &json!({ "query": "SELECT id, body FROM notes" }))
            .unwrap();
        assert_eq!(rows["row_count"], 1);
        assert_eq!(rows["rows"][0]["body"], "hello");
        assert_eq!(rows["rows"][0]["id"], 1);
    }

    #[test]
    fn bad_sql_is_a_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = tools_in(dir.path())
            .call("db_query", &json!({ "query": "SELEKT nothing" }))
            .unwrap_err();
        assert!(err.to_string().contains("query failed"));
    }

    #[test]
    fn missing_statement_is_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let err = tools_in(dir.path()).call("db_execute", &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
