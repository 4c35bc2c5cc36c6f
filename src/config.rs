//! Configuration
//!
//! `AgencyConfig` is read from an optional YAML file, then overridden by
//! environment variables (a `.env` file is loaded first). `RunOptions`
//! carries per-run settings on top of that.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agent::{supports_thinking, AgentError, AgentResult, DEFAULT_LOCAL_MODEL, DEFAULT_REMOTE_MODEL};
use crate::orchestrator::{Objective, RouterConfig};

pub const DEFAULT_REMOTE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP endpoint
    Remote,
    /// Local Ollama server
    Local,
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(ProviderKind::Remote),
            "local" | "ollama" => Ok(ProviderKind::Local),
            other => Err(AgentError::Configuration(format!("unknown provider '{}' (remote|local)", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackendKind {
    Local,
    Cloud,
    Search,
}

impl FromStr for MemoryBackendKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(MemoryBackendKind::Local),
            "cloud" => Ok(MemoryBackendKind::Cloud),
            "search" => Ok(MemoryBackendKind::Search),
            other => Err(AgentError::Configuration(format!(
                "unknown memory backend '{}' (local|cloud|search)", other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessorKind {
    Llm,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Endpoint for remote providers; Ollama host for local ones
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub thinking: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Remote,
            url: None,
            api_key: None,
            model: None,
            thinking: true,
        }
    }
}

impl ProviderConfig {
    pub fn model(&self) -> String {
        match (&self.model, self.kind) {
            (Some(m), _) => m.clone(),
            (None, ProviderKind::Remote) => DEFAULT_REMOTE_MODEL.to_string(),
            (None, ProviderKind::Local) => DEFAULT_LOCAL_MODEL.to_string(),
        }
    }

    pub fn url(&self) -> String {
        match (&self.url, self.kind) {
            (Some(u), _) => u.clone(),
            (None, ProviderKind::Remote) => DEFAULT_REMOTE_URL.to_string(),
            (None, ProviderKind::Local) => DEFAULT_OLLAMA_HOST.to_string(),
        }
    }

    /// Thinking is never used on local servers or with models that lack it
    pub fn effective_thinking(&self) -> bool {
        self.thinking && self.kind == ProviderKind::Remote && supports_thinking(&self.model())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub backend: MemoryBackendKind,
    /// Directory of the local index
    pub path: PathBuf,
    pub namespace: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub dimension: usize,
    /// Records retrieved per objective
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: MemoryBackendKind::Local,
            path: PathBuf::from("memory"),
            namespace: "meta_agent".to_string(),
            url: None,
            api_key: None,
            username: None,
            password: None,
            dimension: crate::memory::DEFAULT_DIMENSION,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Upper bound on sub-agents per delegation
    pub roster_size: usize,
    pub max_concurrency: usize,
    pub task_timeout_secs: u64,
    /// Step budget of each sub-agent
    pub worker_steps: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            roster_size: 3,
            max_concurrency: 3,
            task_timeout_secs: 120,
            worker_steps: 4,
        }
    }
}

impl SwarmConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub max_attempts: usize,
    /// Where passing tools are persisted and loaded from
    pub tools_dir: PathBuf,
    pub persist: bool,
    pub script_timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            tools_dir: PathBuf::from("tools"),
            persist: true,
            script_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessorConfig {
    pub kind: AssessorKind,
    /// Score used when the model's self-assessment is unusable
    pub degraded_score: f32,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self { kind: AssessorKind::Llm, degraded_score: 0.3 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgencyConfig {
    pub provider: ProviderConfig,
    pub memory: MemoryConfig,
    pub router: RouterConfig,
    pub swarm: SwarmConfig,
    pub synthesis: SynthesisConfig,
    pub assessor: AssessorConfig,
}

impl AgencyConfig {
    /// YAML file (if any), then `.env` and process environment
    pub fn load(path: Option<&Path>) -> AgentResult<Self> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Configuration(format!("cannot read config {:?}: {}", path, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> AgentResult<Self> {
        serde_yaml::from_str(content).map_err(|e| AgentError::Configuration(format!("invalid config: {}", e)))
    }

    /// Apply overrides from a variable lookup (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AgentResult<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("AGENCY_PROVIDER") {
            self.provider.kind = v.parse()?;
        }
        if let Some(v) = var("AGENCY_PROVIDER_URL") {
            self.provider.url = Some(v);
        }
        if let Some(v) = var("AGENCY_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = var("AGENCY_MODEL") {
            self.provider.model = Some(v);
        }
        if self.provider.kind == ProviderKind::Local && self.provider.url.is_none() {
            self.provider.url = var("OLLAMA_HOST");
        }
        if let Some(v) = var("AGENCY_MEMORY_BACKEND") {
            self.memory.backend = v.parse()?;
        }
        if let Some(v) = var("AGENCY_MEMORY_PATH") {
            self.memory.path = PathBuf::from(v);
        }
        if let Some(v) = var("AGENCY_MEMORY_URL") {
            self.memory.url = Some(v);
        }
        if let Some(v) = var("AGENCY_MEMORY_API_KEY") {
            self.memory.api_key = Some(v);
        }
        if let Some(v) = var("AGENCY_SEARCH_USERNAME") {
            self.memory.username = Some(v);
        }
        if let Some(v) = var("AGENCY_SEARCH_PASSWORD") {
            self.memory.password = Some(v);
        }
        Ok(())
    }

    /// Fail fast on settings no run could succeed with
    pub fn validate(&self) -> AgentResult<()> {
        self.router.validate()?;

        if self.provider.kind == ProviderKind::Remote && self.provider.api_key.is_none() {
            return Err(AgentError::Configuration(
                "remote provider needs an API key (AGENCY_API_KEY)".to_string(),
            ));
        }
        if self.swarm.roster_size == 0 || self.swarm.max_concurrency == 0 || self.swarm.worker_steps == 0 {
            return Err(AgentError::Configuration(
                "swarm roster_size, max_concurrency and worker_steps must be at least 1".to_string(),
            ));
        }
        if self.swarm.roster_size > self.swarm.max_concurrency {
            return Err(AgentError::Configuration(format!(
                "swarm.roster_size ({}) must not exceed swarm.max_concurrency ({})",
                self.swarm.roster_size, self.swarm.max_concurrency
            )));
        }
        if self.synthesis.max_attempts == 0 {
            return Err(AgentError::Configuration("synthesis.max_attempts must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.assessor.degraded_score) {
            return Err(AgentError::Configuration("assessor.degraded_score must be within [0, 1]".to_string()));
        }

        let memory = &self.memory;
        if memory.enabled {
            if memory.dimension == 0 || memory.top_k == 0 {
                return Err(AgentError::Configuration("memory.dimension and memory.top_k must be at least 1".to_string()));
            }
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            match memory.backend {
                MemoryBackendKind::Local => {}
                MemoryBackendKind::Cloud if missing(&memory.url) || missing(&memory.api_key) => {
                    return Err(AgentError::Configuration(
                        "cloud memory needs AGENCY_MEMORY_URL and AGENCY_MEMORY_API_KEY".to_string(),
                    ));
                }
                MemoryBackendKind::Search
                    if missing(&memory.url) || missing(&memory.username) || missing(&memory.password) =>
                {
                    return Err(AgentError::Configuration(
                        "search memory needs AGENCY_MEMORY_URL, AGENCY_SEARCH_USERNAME and AGENCY_SEARCH_PASSWORD".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Per-run settings layered over `AgencyConfig`
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model: Option<String>,
    pub server: Option<ProviderKind>,
    pub max_steps: usize,
    pub thinking: bool,
    pub memory_path: Option<PathBuf>,
    pub memory_backend: Option<MemoryBackendKind>,
    pub memory_enabled: bool,
    pub verbose: bool,
    pub run_timeout: Option<Duration>,
    pub config_path: Option<PathBuf>,
    /// Structured data handed to the model alongside the objective
    pub context: Option<serde_json::Value>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            model: None,
            server: None,
            max_steps: 10,
            thinking: true,
            memory_path: None,
            memory_backend: None,
            memory_enabled: true,
            verbose: false,
            run_timeout: None,
            config_path: None,
            context: None,
        }
    }
}

impl RunOptions {
    pub fn apply(&self, config: &mut AgencyConfig) {
        if let Some(server) = self.server {
            if server != config.provider.kind {
                config.provider.kind = server;
                config.provider.url = None;
                config.provider.model = None;
            }
        }
        if let Some(model) = &self.model {
            config.provider.model = Some(model.clone());
        }
        config.provider.thinking &= self.thinking;
        if let Some(path) = &self.memory_path {
            config.memory.path = path.clone();
        }
        if let Some(backend) = self.memory_backend {
            config.memory.backend = backend;
        }
        config.memory.enabled &= self.memory_enabled;
    }

    /// Build the run's objective, attaching `context` when set
    pub fn objective(&self, text: &str) -> AgentResult<Objective> {
        match &self.context {
            Some(context) => Objective::with_context(text, context.clone()),
            None => Objective::new(text),
        }
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.max_steps == 0 {
            return Err(AgentError::Configuration("max_steps must be at least 1".to_string()));
        }
        if self.run_timeout.is_some_and(|t| t.is_zero()) {
            return Err(AgentError::Configuration("run timeout must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_yaml_with_defaults() {
        let config = AgencyConfig::from_yaml("router:\n  high_threshold: 0.9\nswarm:\n  roster_size: 2\n").unwrap();
        assert_eq!(config.router.high_threshold, 0.9);
        assert_eq!(config.router.low_threshold, 0.5);
        assert_eq!(config.swarm.roster_size, 2);
        assert_eq!(config.memory.namespace, "meta_agent");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AgencyConfig::default();
        config.apply_env(env(&[
            ("AGENCY_PROVIDER", "local"),
            ("OLLAMA_HOST", "http://gpu-box:11434"),
            ("AGENCY_MEMORY_BACKEND", "search"),
        ])).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Local);
        assert_eq!(config.provider.url(), "http://gpu-box:11434");
        assert_eq!(config.memory.backend, MemoryBackendKind::Search);

        let bad = AgencyConfig::default().apply_env(env(&[("AGENCY_MEMORY_BACKEND", "floppy")]));
        assert!(matches!(bad, Err(AgentError::Configuration(_))));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = AgencyConfig::default();
        assert!(config.validate().is_err());

        config.provider.api_key = Some("sk-test".into());
        assert!(config.validate().is_ok());

        config.memory.backend = MemoryBackendKind::Cloud;
        assert!(config.validate().is_err());
        config.memory.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_thinking_is_remote_only() {
        let mut provider = ProviderConfig { model: Some("claude-sonnet-4".into()), ..Default::default() };
        assert!(provider.effective_thinking());
        provider.kind = ProviderKind::Local;
        assert!(!provider.effective_thinking());
    }

    #[test]
    fn test_run_options_overlay() {
        let mut config = AgencyConfig::default();
        let opts = RunOptions {
            server: Some(ProviderKind::Local),
            thinking: false,
            memory_enabled: false,
            ..Default::default()
        };
        opts.apply(&mut config);
        assert_eq!(config.provider.model(), DEFAULT_LOCAL_MODEL);
        assert!(!config.provider.thinking);
        assert!(!config.memory.enabled);
        assert!(RunOptions { max_steps: 0, ..Default::default() }.validate().is_err());
    }

    #[test]
    fn test_roster_cannot_outgrow_concurrency() {
        let mut config = AgencyConfig::default();
        config.provider.api_key = Some("sk-test".into());
        config.swarm.roster_size = 5;
        config.swarm.max_concurrency = 2;
        assert!(matches!(config.validate(), Err(AgentError::Configuration(_))));

        config.swarm.max_concurrency = 5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_options_carry_context() {
        let opts = RunOptions { context: Some(serde_json::json!({"region": "EU"})), ..Default::default() };
        let objective = opts.objective("summarize sales").unwrap();
        assert_eq!(objective.context(), Some(&serde_json::json!({"region": "EU"})));
        assert!(objective.format_for_prompt().contains("CONTEXT: {\"region\":\"EU\"}"));

        assert!(RunOptions::default().objective("summarize sales").unwrap().context().is_none());
        assert!(RunOptions::default().objective("  ").is_err());
    }
}
