//! Tool System Module
//!
//! Provides the tool registry (built-in and synthesized tools), script
//! execution for synthesized tools, and result caching.

mod spec;
mod dynamic;
mod synthesizer;
mod builtin;

pub use spec::{PersistedTool, ScriptDefinition, ToolDefinition, ToolId, ToolOrigin, ToolSpec, ValidationState};
pub use dynamic::{load_tool, save_tool, ProcessRunner, ScriptRunner, SUPPORTED_LANGUAGES};
pub use synthesizer::{SmokeTest, SynthesisCandidate, SynthesisError, ToolSynthesizer};
pub use builtin::{
    CodeTool, CurrentTimeTool, HttpRequestTool, MemoryQueryTool, MemoryStoreTool, ThinkTool, MEMORY_STORE_TOOL,
};

use crate::agent::AgentResult;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Output from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data (can be string, JSON object, etc.)
    pub data: Value,
    /// Human-readable summary of the output
    pub summary: String,
    /// Optional error message if success is false
    pub error: Option<String>,
}

impl ToolOutput {
    /// Create a successful output
    pub fn success(data: impl Into<Value>, summary: impl Into<String>) -> Self {
        Self {
            success: true,
            data: data.into(),
            summary: summary.into(),
            error: None,
        }
    }

    /// Create a successful output with string data
    pub fn success_str(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            success: true,
            summary: content.clone(),
            data: Value::String(content),
            error: None,
        }
    }

    /// Create a failed output
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            data: Value::Null,
            summary: format!("Error: {}", error),
            error: Some(error),
        }
    }
}

/// A tool call request parsed from LLM output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Name of the tool to call
    #[serde(alias = "tool")]
    pub name: String,
    /// Parameters for the tool
    #[serde(default, alias = "input")]
    pub parameters: Value,
}

/// Trait for compiled-in tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of the tool
    fn name(&self) -> String;

    /// Get a description of what the tool does
    fn description(&self) -> String;

    /// Get the JSON schema for the tool's parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with the given parameters
    async fn execute(&self, params: Value) -> AgentResult<ToolOutput>;

    /// Whether equal inputs always give equal outputs. Only such tools are cached.
    fn cacheable(&self) -> bool {
        false
    }
}

/// Registration refused because a validated tool already holds the name
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tool '{name}' is already registered and validated")]
pub struct DuplicateNameError {
    pub name: String,
}

struct Entry {
    spec: ToolSpec,
    revision: u32,
}

#[derive(Default)]
struct Catalog {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

/// Registry for available tools with built-in caching
pub struct ToolRegistry {
    catalog: RwLock<Catalog>,
    cache: Mutex<HashMap<String, ToolOutput>>,
    runner: Arc<dyn ScriptRunner>,
}

impl ToolRegistry {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            cache: Mutex::new(HashMap::new()),
            runner,
        }
    }

    /// Add a tool. A name held by a `Passed` tool is refused; any other
    /// existing entry is replaced in place with a bumped revision.
    pub async fn register(&self, spec: ToolSpec) -> Result<ToolId, DuplicateNameError> {
        let mut catalog = self.catalog.write().await;
        let name = spec.name.clone();

        let revision = match catalog.entries.get(&name) {
            Some(existing) if existing.spec.is_passed() => {
                return Err(DuplicateNameError { name });
            }
            Some(existing) => existing.revision + 1,
            None => {
                catalog.order.push(name.clone());
                1
            }
        };

        debug!("Registered tool '{}' rev {} ({:?})", name, revision, spec.validation_state);
        catalog.entries.insert(name.clone(), Entry { spec, revision });
        Ok(ToolId { name, revision })
    }

    /// Register a compiled-in tool instance
    pub async fn register_instance<T: Tool + 'static>(&self, tool: T) -> Result<ToolId, DuplicateNameError> {
        self.register(ToolSpec::builtin(Arc::new(tool))).await
    }

    pub async fn lookup(&self, name: &str) -> Option<ToolSpec> {
        let catalog = self.catalog.read().await;
        catalog.entries.get(name).map(|e| e.spec.clone())
    }

    pub async fn revision(&self, name: &str) -> Option<ToolId> {
        let catalog = self.catalog.read().await;
        catalog.entries.get(name).map(|e| ToolId { name: name.to_string(), revision: e.revision })
    }

    /// All specs in registration order
    pub async fn list(&self) -> Vec<ToolSpec> {
        let catalog = self.catalog.read().await;
        catalog.order.iter()
            .filter_map(|name| catalog.entries.get(name))
            .map(|e| e.spec.clone())
            .collect()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.catalog.read().await.order.clone()
    }

    pub async fn len(&self) -> usize {
        self.catalog.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.catalog.read().await.order.is_empty()
    }

    /// Load persisted synthesized tools from a directory
    pub async fn load_dynamic_tools(&self, dir_path: impl AsRef<Path>) -> Result<usize> {
        let path = dir_path.as_ref();
        if !path.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(path)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match load_tool(&path) {
                Ok(spec) if spec.validation_state == ValidationState::Failed => {
                    debug!("Skipping failed tool at {:?}", path);
                }
                Ok(spec) => {
                    let name = spec.name.clone();
                    match self.register(spec).await {
                        Ok(_) => {
                            info!("Loaded dynamic tool: {}", name);
                            count += 1;
                        }
                        Err(e) => warn!("Skipping dynamic tool at {:?}: {}", path, e),
                    }
                }
                Err(e) => warn!("Failed to load dynamic tool at {:?}: {}", path, e),
            }
        }
        Ok(count)
    }

    /// Generate a combined schema for all tools (for LLM prompt)
    pub async fn generate_tools_prompt(&self) -> String {
        let names = self.tool_names().await;
        self.generate_filtered_tools_prompt(&names).await
    }

    /// Generate a schema for specific tools, in registration order
    pub async fn generate_filtered_tools_prompt(&self, allowed_names: &[String]) -> String {
        let catalog = self.catalog.read().await;
        let visible: Vec<&Entry> = catalog.order.iter()
            .filter(|n| allowed_names.contains(n))
            .filter_map(|n| catalog.entries.get(n))
            .collect();

        if visible.is_empty() {
            return "No tools available for this task.\n".to_string();
        }

        let mut prompt = String::from("Available Tools:\n\n");
        for entry in visible {
            prompt.push_str(&format!("- {}: {} (params: {})\n",
                entry.spec.name,
                entry.spec.description,
                serde_json::to_string(&entry.spec.parameters()).unwrap_or_default()
            ));
        }
        prompt
    }

    /// Run a tool by name. Unknown names yield a failed output, not an error.
    pub async fn invoke(&self, name: &str, input: Value) -> AgentResult<ToolOutput> {
        let found = {
            let catalog = self.catalog.read().await;
            catalog.entries.get(name).map(|e| (e.spec.definition.clone(), e.revision))
        };
        let Some((definition, revision)) = found else {
            return Ok(ToolOutput::failure(format!("Unknown tool: {}", name)));
        };

        let cacheable = match &definition {
            ToolDefinition::Builtin(tool) => tool.cacheable(),
            ToolDefinition::Synthesized(_) => true,
        };
        let cache_key = format!("{}@{}:{}", name, revision, serde_json::to_string(&input)?);
        if cacheable {
            let cache = self.cache.lock().await;
            if let Some(output) = cache.get(&cache_key) {
                debug!("Cache Hit for tool: {}", name);
                return Ok(output.clone());
            }
        }

        let result = match &definition {
            ToolDefinition::Builtin(tool) => tool.execute(input).await?,
            ToolDefinition::Synthesized(script) => self.runner.run(script, &input).await?,
        };

        if cacheable && result.success {
            self.cache.lock().await.insert(cache_key, result.clone());
        }
        Ok(result)
    }

    /// Execute a parsed tool call
    pub async fn execute(&self, call: &ToolCall) -> AgentResult<ToolOutput> {
        self.invoke(&call.name, call.parameters.clone()).await
    }

    /// Clear the tool cache
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub fn runner(&self) -> Arc<dyn ScriptRunner> {
        self.runner.clone()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ProcessRunner::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTool {
        calls: Arc<AtomicUsize>,
        pure: bool,
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> String { "mock_tool".to_string() }
        fn description(&self) -> String { "A mock tool for testing".to_string() }
        fn parameters(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, params: Value) -> AgentResult<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput::success(params, "Mock execution successful"))
        }
        fn cacheable(&self) -> bool { self.pure }
    }

    struct EchoRunner;

    #[async_trait]
    impl ScriptRunner for EchoRunner {
        async fn run(&self, script: &ScriptDefinition, input: &Value) -> AgentResult<ToolOutput> {
            Ok(ToolOutput::success_str(format!("{}:{}", script.code, input)))
        }
    }

    fn script(code: &str) -> ScriptDefinition {
        ScriptDefinition { language: "shell".into(), code: code.into(), parameters: json!({}) }
    }

    #[tokio::test]
    async fn test_tool_registration() {
        let registry = ToolRegistry::default();
        let id = registry.register_instance(MockTool::default()).await.unwrap();
        assert_eq!(id, ToolId { name: "mock_tool".into(), revision: 1 });

        let spec = registry.lookup("mock_tool").await.unwrap();
        assert_eq!(spec.created_by, ToolOrigin::Builtin);
        assert!(spec.is_passed());
    }

    #[tokio::test]
    async fn test_tool_execution_caching() {
        let registry = ToolRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_instance(MockTool { calls: calls.clone(), pure: true }).await.unwrap();

        let call = ToolCall { name: "mock_tool".to_string(), parameters: json!({"input": "test"}) };
        let res1 = registry.execute(&call).await.unwrap();
        let res2 = registry.execute(&call).await.unwrap();
        assert_eq!(res1, res2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_uncacheable_tool_runs_every_time() {
        let registry = ToolRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_instance(MockTool { calls: calls.clone(), pure: false }).await.unwrap();

        let call = ToolCall { name: "mock_tool".to_string(), parameters: json!({}) };
        registry.execute(&call).await.unwrap();
        registry.execute(&call).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clock_is_never_stale() {
        let registry = ToolRegistry::default();
        registry.register_instance(CurrentTimeTool).await.unwrap();

        let first = registry.invoke("current_time", json!({})).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let second = registry.invoke("current_time", json!({})).await.unwrap();
        assert_ne!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_passed_name_is_refused() {
        let registry = ToolRegistry::new(Arc::new(EchoRunner));
        let spec = ToolSpec::synthesized("fetch", "v1", script("a")).with_state(ValidationState::Passed);
        registry.register(spec.clone()).await.unwrap();

        let err = registry.register(spec).await.unwrap_err();
        assert_eq!(err.name, "fetch");
    }

    #[tokio::test]
    async fn test_untested_revision_keeps_position() {
        let registry = ToolRegistry::new(Arc::new(EchoRunner));
        registry.register(ToolSpec::synthesized("first", "v1", script("a"))).await.unwrap();
        registry.register(ToolSpec::synthesized("second", "v1", script("b"))).await.unwrap();

        let id = registry.register(ToolSpec::synthesized("first", "v2", script("c"))).await.unwrap();
        assert_eq!(id.revision, 2);

        let names: Vec<_> = registry.list().await.into_iter().map(|s| s.description).collect();
        assert_eq!(names, vec!["v2", "v1"]);
    }

    #[tokio::test]
    async fn test_synthesized_dispatch_and_revision_cache() {
        let registry = ToolRegistry::new(Arc::new(EchoRunner));
        registry.register(ToolSpec::synthesized("t", "", script("old"))).await.unwrap();
        let out = registry.invoke("t", json!(1)).await.unwrap();
        assert_eq!(out.summary, "old:1");

        registry.register(ToolSpec::synthesized("t", "", script("new"))).await.unwrap();
        let out = registry.invoke("t", json!(1)).await.unwrap();
        assert_eq!(out.summary, "new:1");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failed_output() {
        let registry = ToolRegistry::default();
        let out = registry.invoke("missing", json!({})).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_have_one_winner() {
        let registry = Arc::new(ToolRegistry::new(Arc::new(EchoRunner)));
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let spec = ToolSpec::synthesized("shared", format!("copy {}", i), script("x"))
                    .with_state(ValidationState::Passed);
                registry.register(spec).await
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_generate_tools_prompt() {
        let registry = ToolRegistry::default();
        registry.register_instance(MockTool::default()).await.unwrap();

        let prompt = registry.generate_tools_prompt().await;
        assert!(prompt.contains("mock_tool"));
        assert!(prompt.contains("A mock tool for testing"));
        assert!(registry.generate_filtered_tools_prompt(&[]).await.contains("No tools"));
    }

    #[tokio::test]
    async fn test_load_dynamic_tools_skips_failed() {
        let dir = tempfile::tempdir().unwrap();
        save_tool(dir.path(), &ToolSpec::synthesized("good", "", script("x")).with_state(ValidationState::Passed)).unwrap();
        save_tool(dir.path(), &ToolSpec::synthesized("bad", "", script("x")).with_state(ValidationState::Failed)).unwrap();

        let registry = ToolRegistry::new(Arc::new(EchoRunner));
        assert_eq!(registry.load_dynamic_tools(dir.path()).await.unwrap(), 1);
        assert!(registry.lookup("good").await.is_some());
        assert!(registry.lookup("bad").await.is_none());
    }
}
