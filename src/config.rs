// Toolgate - Configuration
//
// Server, security, tool and metrics settings. Loaded once at startup,
// passed by reference into each component. No ambient globals.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SERVER_NAME: &str = "toolgate";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_name: String,
    pub server_version: String,
    pub base_path: String,
    pub security: SecurityConfig,
    pub tools: ToolsConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Exact tool names admitted by the access policy
    pub allowed_tools: Vec<String>,
    /// Sliding-window capacity per tool per minute
    pub max_requests_per_minute: usize,
    /// Literal substrings that make a shell command unsafe
    pub blocked_commands: Vec<String>,
    pub max_file_size_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Hard timeout for system_command (seconds)
    pub command_timeout_secs: u64,
    pub package_timeout_secs: u64,
    pub git_timeout_secs: u64,
    pub max_output_size: usize,
    /// HTTP request timeout (seconds)
    pub request_timeout_secs: u64,
    pub max_response_size: usize,
    pub user_agent: String,
    /// SQLite database file for db_query/db_execute
    pub database_path: String,
    /// OpenAI-compatible endpoint for the ai_* tools
    pub ai_api_base: String,
    pub ai_model: String,
    /// Read from OPENAI_API_KEY when empty
    #[serde(default)]
    pub ai_api_key: String,
    pub ai_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Snapshot file written on shutdown, merged back on startup
    pub metrics_file: String,
}

/// The 22 built-in tools — the default access-policy allow-list
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "file_read", "file_write", "file_search", "file_list",
    "system_info", "system_command", "system_package",
    "web_scrape", "web_api", "web_download",
    "code_analyze", "code_format", "code_lint",
    "git_status", "git_commit", "git_push", "git_pull",
    "db_query", "db_execute",
    "ai_generate", "ai_analyze", "ai_translate",
];

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: SERVER_NAME.to_string(),
            server_version: SERVER_VERSION.to_string(),
            base_path: std::env::current_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| ".".to_string()),
            security: SecurityConfig::default(),
            tools: ToolsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_tools: DEFAULT_ALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
            max_requests_per_minute: 60,
            blocked_commands: vec![
                "rm -rf /".to_string(),
                "format c:".to_string(),
                "del /s /q c:\\".to_string(),
                "sudo".to_string(),
                "su".to_string(),
                "chmod 777".to_string(),
                "chown root".to_string(),
                "mkfs".to_string(),
                "dd if=".to_string(),
                "> /dev/".to_string(),
                "> /proc/".to_string(),
                "rm -rf /etc".to_string(),
                "rm -rf /var".to_string(),
                "rm -rf /usr".to_string(),
            ],
            max_file_size_mb: 100,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            package_timeout_secs: 60,
            git_timeout_secs: 60,
            max_output_size: 1024 * 1024,
            request_timeout_secs: 10,
            max_response_size: 10 * 1024 * 1024,
            user_agent: format!("{}/{}", SERVER_NAME, SERVER_VERSION),
            database_path: "toolgate.db".to_string(),
            ai_api_base: "https://api.openai.com/v1".to_string(),
            ai_model: "gpt-4o-mini".to_string(),
            ai_api_key: String::new(),
            ai_timeout_secs: 60,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_file: "metrics.json".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.security.max_requests_per_minute == 0 {
            anyhow::bail!("max_requests_per_minute must be positive");
        }
        if self.security.max_file_size_mb == 0 {
            anyhow::bail!("max_file_size_mb must be positive");
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.security.max_file_size_mb * 1024 * 1024
    }

    /// AI API key: config value first, then environment
    pub fn ai_api_key(&self) -> Option<String> {
        if !self.tools.ai_api_key.is_empty() {
            return Some(self.tools.ai_api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
    }
}

// ============================================================================
// TESTS
// ============================================================================
