//! Meta Agency
//!
//! A confidence-driven agent orchestration engine. For each objective the
//! agency estimates its own confidence, then either solves it directly with
//! its tools, synthesizes a new tool, or delegates to parallel sub-agents,
//! and records the outcome in long-term memory.

pub mod agent;
pub mod config;
pub mod memory;
pub mod orchestrator;
pub mod tools;
pub mod utils;

pub use agent::{AgentError, AgentResult};
pub use config::{AgencyConfig, RunOptions};
pub use orchestrator::{ExecutionEngine, RunOutcome, RunReport, Strategy};

use std::sync::Arc;
use tracing::{info, warn};

use agent::{
    ConfidenceAssessor, HeuristicAssessor, LLMProvider, LlmAssessor, OllamaProvider, OpenAICompatibleProvider,
    Toolkit,
};
use config::{AssessorKind, ProviderConfig, ProviderKind};
use memory::{Embedder, HashingEmbedder, MemoryStore};
use orchestrator::StrategyRouter;
use tools::{
    CodeTool, CurrentTimeTool, HttpRequestTool, MemoryQueryTool, MemoryStoreTool, ProcessRunner, ScriptRunner, ThinkTool,
    ToolRegistry, ToolSynthesizer,
};

/// Solve one objective with settings from the environment and `options`
pub async fn run(objective: &str, options: RunOptions) -> AgentResult<RunReport> {
    utils::init_logging(options.verbose);
    let objective = options.objective(objective)?;
    options.validate()?;

    let mut config = AgencyConfig::load(options.config_path.as_deref())?;
    options.apply(&mut config);
    config.validate()?;

    let provider = build_provider(&config.provider)?;
    let engine = build_engine(&config, provider).await?;
    engine.run_objective(objective, options.max_steps, options.run_timeout).await
}

pub fn build_provider(config: &ProviderConfig) -> AgentResult<Arc<dyn LLMProvider>> {
    match config.kind {
        ProviderKind::Remote => Ok(Arc::new(
            OpenAICompatibleProvider::new(config.url(), config.api_key.clone())
                .with_thinking(config.effective_thinking()),
        )),
        ProviderKind::Local => {
            let provider = OllamaProvider::from_host(&config.url())
                .map_err(|e| AgentError::Configuration(format!("{:#}", e)))?;
            Ok(Arc::new(provider))
        }
    }
}

fn build_embedder(dimension: usize) -> AgentResult<Arc<dyn Embedder>> {
    #[cfg(feature = "fastembed")]
    {
        if dimension == memory::DEFAULT_DIMENSION {
            let embedder = memory::FastEmbedder::new()
                .map_err(|e| AgentError::Configuration(format!("{:#}", e)))?;
            return Ok(Arc::new(embedder));
        }
    }
    Ok(Arc::new(HashingEmbedder::new(dimension)))
}

/// Wire memory, tools, assessor and router into an engine
pub async fn build_engine(config: &AgencyConfig, provider: Arc<dyn LLMProvider>) -> AgentResult<ExecutionEngine> {
    let model = config.provider.model();

    let embedder = build_embedder(config.memory.dimension)?;
    let memory = match MemoryStore::open(&config.memory, embedder) {
        Ok(store) => store,
        Err(e @ AgentError::MemoryUnavailable(_)) => {
            warn!("Running without memory: {}", e);
            MemoryStore::disabled()
        }
        Err(e) => return Err(e),
    };

    let runner: Arc<dyn ScriptRunner> =
        Arc::new(ProcessRunner::new(std::time::Duration::from_secs(config.synthesis.script_timeout_secs)));
    let registry = Arc::new(ToolRegistry::new(runner.clone()));
    registry.register_instance(ThinkTool::new(provider.clone(), model.clone())).await?;
    registry.register_instance(CurrentTimeTool).await?;
    registry.register_instance(HttpRequestTool::new()?).await?;
    registry.register_instance(MemoryQueryTool::new(memory.clone())).await?;
    registry.register_instance(MemoryStoreTool::new(memory.clone())).await?;
    registry.register_instance(CodeTool::shell(runner.clone())).await?;
    registry.register_instance(CodeTool::python(runner)).await?;

    match registry.load_dynamic_tools(&config.synthesis.tools_dir).await {
        Ok(n) if n > 0 => info!("Loaded {} synthesized tools", n),
        Ok(_) => {}
        Err(e) => warn!("Could not load synthesized tools: {:#}", e),
    }

    let mut synthesizer = ToolSynthesizer::new(provider.clone(), model.clone(), registry.clone())
        .with_max_attempts(config.synthesis.max_attempts);
    if config.synthesis.persist {
        synthesizer = synthesizer.with_tools_dir(&config.synthesis.tools_dir);
    }

    let assessor: Arc<dyn ConfidenceAssessor> = match config.assessor.kind {
        AssessorKind::Llm => Arc::new(
            LlmAssessor::new(provider.clone(), model.clone()).with_degraded_score(config.assessor.degraded_score),
        ),
        AssessorKind::Heuristic => Arc::new(HeuristicAssessor::new()),
    };

    let toolkit = Toolkit {
        provider,
        model,
        registry,
        synthesizer: Arc::new(synthesizer),
        memory,
    };
    let router = StrategyRouter::new(config.router)?;

    Ok(ExecutionEngine::new(toolkit, assessor, router, config.swarm.clone())
        .with_memory_top_k(config.memory.top_k))
}
