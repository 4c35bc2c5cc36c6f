//! Sub-agent worker
//!
//! A short ReAct loop run by one delegated task. Workers can read memory,
//! call the tools in their subset and ask for new tools. They cannot
//! delegate further; the delegation context refuses it.

use std::sync::Arc;
use tracing::{debug, info};

use super::{AgentError, AgentResult, AgentRole, LLMProvider, Reply};
use crate::memory::MemoryStore;
use crate::orchestrator::{prompts, DelegationContext};
use crate::tools::{ToolRegistry, ToolSynthesizer, MEMORY_STORE_TOOL};
use crate::utils::{truncate_text, TruncationPolicy};

/// Everything a worker (or the engine) needs to reason and act
#[derive(Clone)]
pub struct Toolkit {
    pub provider: Arc<dyn LLMProvider>,
    pub model: String,
    pub registry: Arc<ToolRegistry>,
    pub synthesizer: Arc<ToolSynthesizer>,
    pub memory: MemoryStore,
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub answer: String,
    pub steps: usize,
    pub tools_created: Vec<String>,
    pub learnings: usize,
}

pub struct SubAgent {
    role: AgentRole,
    tools: Vec<String>,
    toolkit: Toolkit,
    max_steps: usize,
}

impl SubAgent {
    /// `tools` extends the role's default tool set
    pub fn new(role: AgentRole, tools: Vec<String>, toolkit: Toolkit) -> Self {
        let mut all = role.default_tools();
        for t in tools {
            if !all.contains(&t) {
                all.push(t);
            }
        }
        Self { role, tools: all, toolkit, max_steps: 4 }
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps.max(1);
        self
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub async fn run(mut self, ctx: &DelegationContext, sub_objective: &str) -> AgentResult<WorkerReport> {
        let memories = self.toolkit.memory.retrieve(sub_objective, 3).await;
        let mut history: Vec<String> = Vec::new();
        let mut tools_created = Vec::new();
        let mut learnings = 0;

        for step in 1..=self.max_steps {
            let tools_prompt = self.toolkit.registry.generate_filtered_tools_prompt(&self.tools).await;
            let prompt = prompts::worker_prompt(sub_objective, &tools_prompt, &memories, &history);
            let response = self.toolkit.provider
                .generate(&self.toolkit.model, prompt, Some(self.role.system_prompt().to_string()))
                .await?;

            let observation = match Reply::parse(&response) {
                Reply::Answer(answer) => {
                    info!("{} finished in {} steps", self.role, step);
                    return Ok(WorkerReport { answer, steps: step, tools_created, learnings });
                }
                Reply::Action(call) => {
                    if self.tools.contains(&call.name) {
                        match self.toolkit.registry.invoke(&call.name, call.parameters).await {
                            Ok(output) => {
                                if output.success && call.name == MEMORY_STORE_TOOL {
                                    learnings += 1;
                                }
                                format!("{} -> {}", call.name, output.summary)
                            }
                            Err(e) => format!("{} -> error: {}", call.name, e),
                        }
                    } else {
                        format!("Tool '{}' is not available to this agent", call.name)
                    }
                }
                Reply::Forge(capability) => match self.toolkit.synthesizer.synthesize(&capability).await {
                    Ok(spec) => {
                        tools_created.push(spec.name.clone());
                        self.tools.push(spec.name.clone());
                        format!("New tool '{}' is available: {}", spec.name, spec.description)
                    }
                    Err(e) => format!("Tool creation failed: {}", e),
                },
                Reply::Delegate(_) => match ctx.descend() {
                    Ok(_) => "Delegation is not available to sub-agents".to_string(),
                    Err(e) => format!("Delegation refused: {}", e),
                },
                Reply::Thought(thought) => thought,
            };

            debug!("{} step {}: {}", self.role, step, observation);
            history.push(truncate_text(&observation, TruncationPolicy::Bytes(2000)));
        }

        Err(AgentError::BudgetExhausted { steps: self.max_steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::memory::{HashingEmbedder, LocalVectorIndex};
    use crate::tools::{CurrentTimeTool, MemoryStoreTool};
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct Scripted(Mutex<VecDeque<&'static str>>);

    #[async_trait]
    impl LLMProvider for Scripted {
        async fn generate(&self, _m: &str, _p: String, _s: Option<String>) -> anyhow::Result<String> {
            Ok(self.0.lock().await.pop_front().unwrap_or("ANSWER: out of script").to_string())
        }
    }

    fn toolkit(replies: &[&'static str]) -> Toolkit {
        let provider: Arc<dyn LLMProvider> = Arc::new(Scripted(Mutex::new(replies.iter().copied().collect())));
        let registry = Arc::new(ToolRegistry::default());
        Toolkit {
            synthesizer: Arc::new(ToolSynthesizer::new(provider.clone(), "m", registry.clone())),
            provider,
            model: "m".into(),
            registry,
            memory: MemoryStore::disabled(),
        }
    }

    #[tokio::test]
    async fn test_worker_cannot_delegate() {
        let ctx = DelegationContext::root().descend().unwrap();
        let agent = SubAgent::new(AgentRole::Planner, vec![], toolkit(&["DELEGATE: split further", "ANSWER: did it myself"]));
        let report = agent.run(&ctx, "plan a trip").await.unwrap();
        assert_eq!(report.answer, "did it myself");
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn test_worker_recovers_from_tool_error() {
        let ctx = DelegationContext::root().descend().unwrap();
        let kit = toolkit(&[
            r#"ACTION: {"tool": "current_time", "input": {"utc_offset_hours": 99}}"#,
            "ANSWER: recovered",
        ]);
        kit.registry.register_instance(CurrentTimeTool).await.unwrap();

        let report = SubAgent::new(AgentRole::Planner, vec![], kit).run(&ctx, "when is it").await.unwrap();
        assert_eq!(report.answer, "recovered");
        assert_eq!(report.steps, 2);
    }

    #[tokio::test]
    async fn test_worker_counts_learnings() {
        let ctx = DelegationContext::root().descend().unwrap();
        let kit = toolkit(&[
            r#"ACTION: {"tool": "memory_store", "input": {"content": "vendor A is cheapest"}}"#,
            "ANSWER: noted",
        ]);
        let dir = tempfile::tempdir().unwrap();
        let index = LocalVectorIndex::open(dir.path(), "w", Arc::new(HashingEmbedder::new(32))).unwrap();
        let kit = Toolkit { memory: MemoryStore::with_backend(Arc::new(index)), ..kit };
        kit.registry.register_instance(MemoryStoreTool::new(kit.memory.clone())).await.unwrap();

        let agent = SubAgent::new(AgentRole::Analyst, vec!["memory_store".into()], kit);
        let report = agent.run(&ctx, "compare vendors").await.unwrap();
        assert_eq!(report.learnings, 1);
    }

    #[tokio::test]
    async fn test_worker_budget() {
        let ctx = DelegationContext::root().descend().unwrap();
        let agent = SubAgent::new(AgentRole::Reviewer, vec![], toolkit(&["thinking", "still thinking"]))
            .with_max_steps(2);
        let err = agent.run(&ctx, "review").await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExhausted { steps: 2 }));
    }
}
