//! Built-in tools available to every run

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{ScriptDefinition, ScriptRunner, Tool, ToolOutput};
use crate::agent::{AgentError, AgentResult, LLMProvider};
use crate::memory::MemoryStore;
use crate::orchestrator::prompts;
use crate::utils::{truncate_text, TruncationPolicy};

/// Private reasoning scratchpad backed by the model
pub struct ThinkTool {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl ThinkTool {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into() }
    }
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> String {
        "think".to_string()
    }

    fn description(&self) -> String {
        "Reflect on a problem step by step before acting. Returns the reasoning.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "thought": { "type": "string", "description": "What to reason about" }
            },
            "required": ["thought"]
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let thought = params["thought"]
            .as_str()
            .ok_or_else(|| AgentError::Validation("Missing required parameter: thought".to_string()))?;

        let reply = self.provider
            .generate(&self.model, prompts::think_prompt(thought), None)
            .await?;
        Ok(ToolOutput::success_str(reply))
    }
}

#[derive(Default)]
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> String {
        "current_time".to_string()
    }

    fn description(&self) -> String {
        "Get the current date and time, optionally shifted to a UTC offset in hours.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": { "type": "integer", "description": "Offset from UTC, -12..14", "default": 0 }
            }
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let hours = params["utc_offset_hours"].as_i64().unwrap_or(0);
        let offset = i32::try_from(hours * 3600)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| AgentError::Validation(format!("Invalid UTC offset: {}", hours)))?;

        let now = Utc::now().with_timezone(&offset);
        Ok(ToolOutput::success(
            json!({ "iso": now.to_rfc3339(), "unix": now.timestamp() }),
            now.format("%Y-%m-%d %H:%M:%S %:z").to_string(),
        ))
    }
}

/// Runs a command or snippet through the script runner
pub struct CodeTool {
    name: &'static str,
    language: &'static str,
    field: &'static str,
    runner: Arc<dyn ScriptRunner>,
}

impl CodeTool {
    pub fn shell(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { name: "shell", language: "shell", field: "command", runner }
    }

    pub fn python(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { name: "python_repl", language: "python", field: "code", runner }
    }
}

#[async_trait]
impl Tool for CodeTool {
    fn name(&self) -> String {
        self.name.to_string()
    }

    fn description(&self) -> String {
        match self.language {
            "shell" => "Run a shell command and return its stdout.".to_string(),
            _ => "Run a Python 3 snippet and return what it prints.".to_string(),
        }
    }

    fn parameters(&self) -> Value {
        let mut properties = serde_json::Map::new();
        properties.insert(self.field.to_string(), json!({ "type": "string" }));
        json!({
            "type": "object",
            "properties": properties,
            "required": [self.field]
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let code = params[self.field]
            .as_str()
            .ok_or_else(|| AgentError::Validation(format!("Missing required parameter: {}", self.field)))?;

        let script = ScriptDefinition {
            language: self.language.to_string(),
            code: code.to_string(),
            parameters: Value::Null,
        };
        self.runner.run(&script, &params).await
    }
}

pub struct HttpRequestTool {
    client: Client,
}

impl HttpRequestTool {
    pub fn new() -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Tool(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> String {
        "http_request".to_string()
    }

    fn description(&self) -> String {
        "Make an HTTP GET or POST request and return the status and body.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "enum": ["GET", "POST"], "default": "GET" },
                "body": { "description": "JSON body for POST requests" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let url = params["url"]
            .as_str()
            .ok_or_else(|| AgentError::Validation("Missing required parameter: url".to_string()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Ok(ToolOutput::failure(format!("Unsupported URL scheme: {}", url)));
        }

        let method = params["method"].as_str().unwrap_or("GET").to_uppercase();
        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url).json(&params["body"]),
            other => return Ok(ToolOutput::failure(format!("Unsupported method: {}", other))),
        };

        debug!("{} {}", method, url);
        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(ToolOutput::failure(format!("Request failed: {}", e))),
        };
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let summary = truncate_text(&body, TruncationPolicy::Bytes(4000));

        let data = json!({ "status": status.as_u16(), "body": body });
        if status.is_success() {
            Ok(ToolOutput::success(data, summary))
        } else {
            Ok(ToolOutput {
                success: false,
                data,
                summary: format!("HTTP {}: {}", status, summary),
                error: Some(format!("HTTP {}", status)),
            })
        }
    }
}

/// Read-only search over past runs
pub struct MemoryQueryTool {
    memory: MemoryStore,
}

impl MemoryQueryTool {
    pub fn new(memory: MemoryStore) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryQueryTool {
    fn name(&self) -> String {
        "memory_query".to_string()
    }

    fn description(&self) -> String {
        "Search memory of past objectives and how they turned out.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query" },
                "top_k": { "type": "integer", "description": "Number of results (default 3, max 10)", "default": 3 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| AgentError::Validation("Missing required parameter: query".to_string()))?;
        let top_k = params["top_k"].as_u64().unwrap_or(3).min(10) as usize;

        let hits = self.memory.retrieve(query, top_k).await;
        if hits.is_empty() {
            return Ok(ToolOutput::success_str("No relevant memories found for this query."));
        }

        let formatted = hits.iter()
            .enumerate()
            .map(|(i, (r, score))| format!(
                "{}. [{} | relevance {:.2}] {}\n   {}",
                i + 1,
                if r.success { "ok" } else { "failed" },
                score,
                r.objective,
                r.outcome_summary.chars().take(500).collect::<String>()
            ))
            .collect::<Vec<_>>()
            .join("\n");

        let data = json!(hits.iter().map(|(r, s)| json!({
            "objective": r.objective,
            "outcome": r.outcome_summary,
            "success": r.success,
            "score": s,
        })).collect::<Vec<_>>());

        Ok(ToolOutput::success(data, format!("Found {} relevant memories:\n{}", hits.len(), formatted)))
    }
}

pub const MEMORY_STORE_TOOL: &str = "memory_store";

/// Lets the agent save a learning for future runs
pub struct MemoryStoreTool {
    memory: MemoryStore,
}

impl MemoryStoreTool {
    pub fn new(memory: MemoryStore) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryStoreTool {
    fn name(&self) -> String {
        MEMORY_STORE_TOOL.to_string()
    }

    fn description(&self) -> String {
        "Save a fact or lesson worth remembering in future runs.".to_string()
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "What the learning is about" },
                "content": { "type": "string", "description": "The learning itself" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
        let content = params["content"]
            .as_str()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::Validation("Missing required parameter: content".to_string()))?;
        let topic = params["topic"].as_str().unwrap_or(content);

        match self.memory.record_run(topic, content, true, vec!["learning".to_string()]).await {
            Ok(true) => Ok(ToolOutput::success(json!({ "stored": true }), "Learning stored.")),
            Ok(false) => Ok(ToolOutput::failure("Memory is disabled for this run")),
            Err(e) => Ok(ToolOutput::failure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_time_offset() {
        let out = CurrentTimeTool.execute(json!({"utc_offset_hours": 2})).await.unwrap();
        assert!(out.success);
        assert!(out.summary.ends_with("+02:00"));

        let bad = CurrentTimeTool.execute(json!({"utc_offset_hours": 99})).await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_http_request_rejects_bad_scheme() {
        let tool = HttpRequestTool::new().unwrap();
        let out = tool.execute(json!({"url": "file:///etc/passwd"})).await.unwrap();
        assert!(!out.success);
    }

    struct EchoRunner;

    #[async_trait]
    impl ScriptRunner for EchoRunner {
        async fn run(&self, script: &ScriptDefinition, _input: &Value) -> AgentResult<ToolOutput> {
            Ok(ToolOutput::success_str(format!("{}: {}", script.language, script.code)))
        }
    }

    #[tokio::test]
    async fn test_code_tools_route_to_runner() {
        let runner: Arc<dyn ScriptRunner> = Arc::new(EchoRunner);
        let out = CodeTool::shell(runner.clone()).execute(json!({"command": "ls"})).await.unwrap();
        assert_eq!(out.summary, "shell: ls");

        let out = CodeTool::python(runner.clone()).execute(json!({"code": "print(1)"})).await.unwrap();
        assert_eq!(out.summary, "python: print(1)");

        assert!(CodeTool::python(runner).execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_tool_writes_a_record() {
        use crate::memory::{HashingEmbedder, LocalVectorIndex};

        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(LocalVectorIndex::open(dir.path(), "t", Arc::new(HashingEmbedder::new(64))).unwrap());
        let memory = MemoryStore::with_backend(index.clone());

        let out = MemoryStoreTool::new(memory.clone())
            .execute(json!({"topic": "csv parsing", "content": "the second column is quoted"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(index.len().await, 1);

        let hits = memory.retrieve("csv parsing", 1).await;
        assert!(hits[0].0.tags.contains(&"learning".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_tool_on_disabled_store() {
        let out = MemoryStoreTool::new(MemoryStore::disabled())
            .execute(json!({"content": "x"}))
            .await
            .unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_memory_query_on_disabled_store() {
        let tool = MemoryQueryTool::new(MemoryStore::disabled());
        let out = tool.execute(json!({"query": "anything"})).await.unwrap();
        assert!(out.summary.contains("No relevant memories"));
    }
}
