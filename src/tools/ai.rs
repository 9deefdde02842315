// Toolgate - AI Tools
//
// ai_generate, ai_analyze, ai_translate. All three are thin wrappers
// over one chat-completions call against the configured API base.

use crate::config::ServerConfig;
use crate::registry::{ToolDescriptor, ToolError, ToolHandler};
use crate::tools::ok;
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub struct AiTools {
    config: Arc<ServerConfig>,
    client: Client,
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "ai_generate",
            "Generate text from a prompt",
            json!({
                "prompt": {"type": "string", "description": "Prompt to generate from"},
                "max_tokens": {"type": "integer", "description": "Maximum tokens to generate", "default": 1024}
            }),
            &["prompt"],
        ),
        ToolDescriptor::new(
            "ai_analyze",
            "Analyze text (sentiment, summary, key points)",
            json!({
                "text": {"type": "string", "description": "Text to analyze"},
                "analysis_type": {"type": "string", "description": "Kind of analysis to run", "default": "summary"}
            }),
            &["text"],
        ),
        ToolDescriptor::new(
            "ai_translate",
            "Translate text into a target language",
            json!({
                "text": {"type": "string", "description": "Text to translate"},
                "target_language": {"type": "string", "description": "Language to translate into"}
            }),
            &["text", "target_language"],
        ),
    ]
}

impl AiTools {
    pub fn new(config: Arc<ServerConfig>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.tools.user_agent.clone())
            .timeout(Duration::from_secs(config.tools.ai_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn chat(&self, system: &str, user: &str, max_tokens: u64) -> Result<String, ToolError> {
        let key = self.config.ai_api_key().ok_or_else(|| {
            ToolError::failed("AI API key not configured (set tools.ai_api_key or OPENAI_API_KEY)")
        })?;

        let url = format!("{}/chat/completions", self.config.tools.ai_api_base.trim_end_matches('/'));
        let body = json!({
            "model": &self.config.tools.ai_model,
            "max_tokens": max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .map_err(|e| ToolError::failed(format!("AI request failed: {}", e)))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .map_err(|e| ToolError::failed(format!("AI response was not JSON: {}", e)))?;

        if !status.is_success() {
            let detail = payload["error"]["message"].as_str().unwrap_or("unknown error");
            return Err(ToolError::failed(format!("AI API error ({}): {}", status, detail)));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ToolError::failed("AI response missing completion content"))
    }

    fn generate(&self, args: &Value) -> Result<Value, ToolError> {
        let prompt = required_str(args, "prompt")?;
        let max_tokens = args.get("max_tokens").and_then(|v| v.as_u64()).unwrap_or(1024);

        let content = self.chat("You are a helpful assistant.", prompt, max_tokens)?;
        Ok(ok(json!({
            "model": &self.config.tools.ai_model,
            "content": content,
        })))
    }

    fn analyze(&self, args: &Value) -> Result<Value, ToolError> {
        let text = required_str(args, "text")?;
        let analysis_type = args
            .get("analysis_type")
            .and_then(|v| v.as_str())
            .unwrap_or("summary");

        let system = format!(
            "You are a text analyst. Produce a concise {} of the user's text.",
            analysis_type
        );
        let content = self.chat(&system, text, 1024)?;
        Ok(ok(json!({
            "analysis_type": analysis_type,
            "analysis": content,
        })))
    }

    fn translate(&self, args: &Value) -> Result<Value, ToolError> {
        let text = required_str(args, "text")?;
        let target = required_str(args, "target_language")?;

        let system = format!(
            "You are a translator. Translate the user's text into {}. Reply with the translation only.",
            target
        );
        let content = self.chat(&system, text, 2048)?;
        Ok(ok(json!({
            "target_language": target,
            "translation": content,
        })))
    }
}

impl ToolHandler for AiTools {
    fn call(&self, tool: &str, args: &Value) -> Result<Value, ToolError> {
        match tool {
            "ai_generate" => self.generate(args),
            "ai_analyze" => self.analyze(args),
            "ai_translate" => self.translate(args),
            _ => Err(ToolError::invalid(format!("unknown ai tool: {}", tool))),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::invalid(format!("missing required argument: {}", key)))
}

// ============================================================================
// TESTS
// ============================================================================
