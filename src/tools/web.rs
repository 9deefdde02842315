// Toolgate - Web Tools
//
// web_scrape, web_api, web_download. One blocking HTTP client shared
// by all three; every target URL passes an SSRF guard before any
// request leaves the process.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::security::AccessPolicy;
use crate::tools::ok;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

pub struct WebTools {
    config: Arc<ServerConfig>,
    policy: Arc<AccessPolicy>,
    client: Client,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "web_scrape",
            "Scrape content from a webpage as readable text",
            json!({
                "url": {"type": "string", "description": "URL to scrape"}
            }),
            &["url"],
        ),
        ToolDescriptor::new(
            "web_api",
            "Make an API call",
            json!({
                "url": {"type": "string", "description": "API URL"},
                "method": {"type": "string", "description": "HTTP method", "default": "GET"},
                "data": {"type": "object", "description": "Request data (sent as JSON body)"}
            }),
            &["url"],
        ),
        ToolDescriptor::new(
            "web_download",
            "Download a file from a URL and save it to disk",
            json!({
                "url": {"type": "string", "description": "URL to download"},
                "save_path": {"type": "string", "description": "Local path to save the file"}
            }),
            &["url", "save_path"],
        ),
    ]
}

/// Reject URLs that would let a caller reach loopback, private or
/// link-local networks through the server
fn validate_url(url: &str) -> Result<(), ToolError> {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ToolError::invalid(format!("Only http/https URLs allowed: {}", url)))?;

    let host_port = without_scheme
        .split('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .to_lowercase();
    let host = host_port.split(':').next().unwrap_or("");

    if host.is_empty() {
        return Err(ToolError::invalid(format!("URL has no host: {}", url)));
    }
    if host == "localhost" || host == "0.0.0.0" || host == "[::1]" {
        return Err(ToolError::failed(format!("SSRF blocked: loopback host: {}", host)));
    }
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        if addr.is_loopback() || addr.is_private() || addr.is_link_local() {
            return Err(ToolError::failed(format!("SSRF blocked: internal IP: {}", host)));
        }
    }
    Ok(())
}

impl WebTools {
    pub fn new(config: Arc<ServerConfig>, policy: Arc<AccessPolicy>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.tools.user_agent.clone())
            .timeout(Duration::from_secs(config.tools.request_timeout_secs))
            .build()?;
        Ok(Self { config, policy, client })
    }

    fn scrape(&self, args: &Value) -> Result<Value, ToolError> {
        let url = required_str(args, "url")?;
        validate_url(url)?;

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ToolError::failed(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response
            .text()
            .map_err(|e| ToolError::failed(format!("read failed: {}", e)))?;

        let text = if content_type.contains("html") {
            html2text::from_read(body.as_bytes(), 100)
        } else {
            body
        };
        let text = truncate(text, self.config.tools.max_response_size);

        Ok(ok(json!({
            "url": url,
            "status_code": status,
            "content": text,
        })))
    }

    fn api_call(&self, args: &Value) -> Result<Value, ToolError> {
        let url = required_str(args, "url")?;
        let method = args.get("method").and_then(|v| v.as_str()).unwrap_or("GET");
        let data = args.get("data");
        validate_url(url)?;

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            other => {
                return Err(ToolError::invalid(format!("Unsupported method: {}", other)));
            }
        };
        let request = match data {
            Some(body) if method.to_uppercase() != "GET" => request.json(body),
            _ => request,
        };

        let response = request
            .send()
            .map_err(|e| ToolError::failed(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ToolError::failed(format!("read failed: {}", e)))?;

        Ok(ok(json!({
            "url": url,
            "method": method.to_uppercase(),
            "status_code": status,
            "content": truncate(body, self.config.tools.max_response_size),
        })))
    }

    fn download(&self, args: &Value) -> Result<Value, ToolError> {
        let url = required_str(args, "url")?;
        let save_path = required_str(args, "save_path")?;
        validate_url(url)?;

        if !self.policy.validate_file_path(save_path, &self.config.base_path) {
            return Err(ToolError::invalid(format!(
                "save_path escapes base directory: {}",
                save_path
            )));
        }

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ToolError::failed(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::failed(format!("download failed: HTTP {}", status)));
        }
        let bytes = response
            .bytes()
            .map_err(|e| ToolError::failed(format!("read failed: {}", e)))?;
        if bytes.len() as u64 > self.config.max_file_size_bytes() {
            return Err(ToolError::failed(format!(
                "download too large: {} bytes",
                bytes.len()
            )));
        }

        let full = if std::path::Path::new(save_path).is_absolute() {
            std::path::PathBuf::from(save_path)
        } else {
            std::path::Path::new(&self.config.base_path).join(save_path)
        };
        std::fs::write(&full, &bytes)?;

        Ok(ok(json!({
            "url": url,
            "path": full.to_string_lossy(),
            "size": bytes.len(),
        })))
    }
}

impl ToolHandler for WebTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "web_scrape" => self.scrape(args),
            "web_api" => self.api_call(args),
            "web_download" => self.download(args),
            _ => Err(ToolError::invalid(format!("unknown web tool: {}", tool))),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument: {}", key)))
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("…");
    }
    s
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_schemes_allowed() {
        assert!(validate_url("https://example.com/page").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn internal_hosts_blocked() {
        assert!(validate_url("http://localhost:8080/admin").is_err());
        assert!(validate_url("http://127.0.0.1/").is_err());
        assert!(validate_url("http://10.0.0.5/secret").is_err());
        assert!(validate_url("http://192.168.1.1/").is_err());
        assert!(validate_url("http://169.254.169.254/latest/meta-data").is_err());
    }

    #[test]
    fn unsupported_method_is_invalid_params() {
        let config = Arc::new(ServerConfig::default());
        let policy = Arc::new(AccessPolicy::new(&config.security));
        let tools = WebTools::new(config, policy).unwrap();
        let err = tools
            .call("web_api", &json!({ "url": "https://example.com", "method": "TRACE" }))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));
    }
}
