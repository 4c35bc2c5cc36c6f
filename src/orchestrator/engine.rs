//! Execution Engine
//!
//! The top-level run loop:
//! `Init -> Assess -> Route -> {Direct | Synthesize | Delegate} -> Record -> Done`,
//! with `Failed` reachable from Init and Assess. Every run that reaches
//! Route is recorded to memory exactly once.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::{
    prompts, AgentCoordinator, DelegationContext, EngineState, ExecutionTrace, Objective, RunOutcome,
    Strategy, StrategyRouter, TraceSummary,
};
use crate::agent::{AgentError, AgentResult, ConfidenceAssessor, Reply, Toolkit};
use crate::config::SwarmConfig;
use crate::memory::ScoredRecord;
use crate::tools::MEMORY_STORE_TOOL;
use crate::utils::{truncate_text, TruncationPolicy};

/// Final report of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub answer: String,
    pub outcome: RunOutcome,
    pub strategy: Strategy,
    pub confidence: f32,
    pub rationale: String,
    pub trace_summary: TraceSummary,
}

/// What an execution state produced
struct Execution {
    answer: String,
    outcome: RunOutcome,
}

impl Execution {
    fn new(answer: impl Into<String>, outcome: RunOutcome) -> Self {
        Self { answer: answer.into(), outcome }
    }
}

pub struct ExecutionEngine {
    toolkit: Toolkit,
    assessor: Arc<dyn ConfidenceAssessor>,
    router: StrategyRouter,
    coordinator: AgentCoordinator,
    memory_top_k: usize,
    roster_size: usize,
}

impl ExecutionEngine {
    pub fn new(
        toolkit: Toolkit,
        assessor: Arc<dyn ConfidenceAssessor>,
        router: StrategyRouter,
        swarm: SwarmConfig,
    ) -> Self {
        let roster_size = swarm.roster_size;
        Self {
            coordinator: AgentCoordinator::new(toolkit.clone(), swarm),
            toolkit,
            assessor,
            router,
            memory_top_k: 5,
            roster_size,
        }
    }

    pub fn with_memory_top_k(mut self, k: usize) -> Self {
        self.memory_top_k = k;
        self
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Run one objective to completion.
    ///
    /// Returns `Err` only for an invalid objective or budget and for an
    /// assessor failure. Everything else degrades into the report.
    pub async fn run(
        &self,
        objective: &str,
        max_steps: usize,
        run_timeout: Option<Duration>,
    ) -> AgentResult<RunReport> {
        self.run_objective(Objective::new(objective)?, max_steps, run_timeout).await
    }

    /// Same as [`run`](Self::run) for an objective that may carry context
    #[instrument(skip(self, objective), fields(objective = %truncate_text(objective.text(), TruncationPolicy::Bytes(80))))]
    pub async fn run_objective(
        &self,
        objective: Objective,
        max_steps: usize,
        run_timeout: Option<Duration>,
    ) -> AgentResult<RunReport> {
        // INIT
        if max_steps == 0 {
            return Err(AgentError::Validation("max_steps must be at least 1".to_string()));
        }
        let mut trace = ExecutionTrace::new(max_steps, Strategy::Direct);

        // ASSESS
        let started = Instant::now();
        let memories = match self.toolkit.memory.try_retrieve(objective.text(), self.memory_top_k).await {
            Ok(m) => m,
            Err(e) => {
                warn!("Continuing without memory: {}", e);
                trace.degrade(&e);
                Vec::new()
            }
        };
        let tools = self.toolkit.registry.list().await;
        let score = match self.assessor.assess(&objective, &memories, &tools).await {
            Ok(score) => score,
            Err(e) => {
                warn!("Run failed during assessment: {}", e);
                debug!("State {:?}", EngineState::Failed);
                return Err(e);
            }
        };
        if score.degraded {
            trace.degrade(&AgentError::AssessmentDegraded(score.rationale.clone()));
        }
        trace.push(EngineState::Assess, "assessor", format!("{:.2}: {}", score.value, score.rationale), true, started.elapsed());

        // ROUTE
        let strategy = self.router.route(&score);
        trace.strategy = strategy;
        trace.push(EngineState::Route, "router", strategy.to_string(), true, Duration::ZERO);

        // DIRECT | SYNTHESIZE | DELEGATE
        let execution = {
            let work = self.execute(strategy, &objective, &memories, &mut trace);
            match run_timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.ok(),
                None => Some(work.await),
            }
        };
        let execution = execution.unwrap_or_else(|| {
            warn!("Run timed out; recording partial result");
            trace.timed_out = true;
            let answer = trace.last_result()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Run timed out before an answer was produced.".to_string());
            Execution::new(answer, RunOutcome::Partial)
        });

        // RECORD
        let learnings_stored = self.record(&objective, &execution, &mut trace).await;

        info!(
            "Run finished: {} via {} in {} steps",
            execution.outcome.as_str(),
            trace.strategy,
            trace.steps_taken()
        );
        debug!("State {:?}", EngineState::Done);

        Ok(RunReport {
            answer: execution.answer,
            outcome: execution.outcome,
            strategy: trace.strategy,
            confidence: score.value,
            rationale: score.rationale,
            trace_summary: trace.summary(learnings_stored),
        })
    }

    async fn execute(
        &self,
        strategy: Strategy,
        objective: &Objective,
        memories: &[ScoredRecord],
        trace: &mut ExecutionTrace,
    ) -> Execution {
        match strategy {
            Strategy::Direct => self.run_direct(objective, memories, trace).await,
            Strategy::Synthesize => self.run_synthesize(objective, trace).await,
            Strategy::Delegate => self.run_delegate(objective, trace).await,
        }
    }

    fn exhausted(trace: &ExecutionTrace) -> Execution {
        let answer = trace.last_result()
            .map(|r| format!("Step budget exhausted. Last result: {}", r))
            .unwrap_or_else(|| "Step budget exhausted before an answer was produced.".to_string());
        Execution::new(answer, RunOutcome::Partial)
    }

    /// Bounded ReAct loop over the registered tools
    async fn run_direct(
        &self,
        objective: &Objective,
        memories: &[ScoredRecord],
        trace: &mut ExecutionTrace,
    ) -> Execution {
        let mut history: Vec<String> = Vec::new();

        loop {
            if !trace.try_spend() {
                return Self::exhausted(trace);
            }
            let step = trace.steps_taken() + 1;
            let started = Instant::now();

            let names = self.toolkit.registry.tool_names().await;
            let tools_prompt = self.toolkit.registry.generate_filtered_tools_prompt(&names).await;
            let prompt = prompts::direct_prompt(objective, &tools_prompt, memories, &history, step, trace.max_steps());

            let response = match self.toolkit.provider
                .generate(&self.toolkit.model, prompt, Some(prompts::DIRECT_SYSTEM.to_string()))
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    let err = AgentError::from(e);
                    trace.degrade(&err);
                    trace.push(EngineState::Direct, "model", err.to_string(), false, started.elapsed());
                    history.push(format!("Model call failed: {}", err));
                    continue;
                }
            };

            match Reply::parse(&response) {
                Reply::Answer(answer) => {
                    trace.push(EngineState::Direct, "model", answer.clone(), true, started.elapsed());
                    return Execution::new(answer, RunOutcome::Success);
                }
                Reply::Action(call) => {
                    let (summary, ok) = match self.toolkit.registry.execute(&call).await {
                        Ok(output) => (output.summary, output.success),
                        Err(e) => {
                            let summary = e.to_string();
                            trace.degrade(&e);
                            (summary, false)
                        }
                    };
                    if ok && call.name == MEMORY_STORE_TOOL {
                        trace.learnings += 1;
                    }
                    debug!("Tool {} -> {}", call.name, summary);
                    trace.push(EngineState::Direct, call.name.clone(), summary.clone(), ok, started.elapsed());
                    history.push(format!(
                        "{}({}) -> {}",
                        call.name,
                        call.parameters,
                        truncate_text(&summary, TruncationPolicy::Bytes(2000))
                    ));
                }
                Reply::Forge(_) | Reply::Delegate(_) => {
                    let note = "Only ACTION and ANSWER are available here.".to_string();
                    trace.push(EngineState::Direct, "model", note.clone(), false, started.elapsed());
                    history.push(note);
                }
                Reply::Thought(thought) => {
                    trace.push(EngineState::Direct, "model", thought.clone(), false, started.elapsed());
                    history.push(truncate_text(&thought, TruncationPolicy::Bytes(2000)));
                }
            }
        }
    }

    /// One step to build a tool, one step to run it. Escalates to delegation
    /// when synthesis is exhausted.
    async fn run_synthesize(&self, objective: &Objective, trace: &mut ExecutionTrace) -> Execution {
        if !trace.try_spend() {
            return Self::exhausted(trace);
        }
        let started = Instant::now();
        let spec = match self.toolkit.synthesizer.synthesize(objective.text()).await {
            Ok(spec) => spec,
            Err(e) => {
                let err = AgentError::Synthesis(e);
                warn!("Escalating to delegation: {}", err);
                trace.degrade(&err);
                trace.push(EngineState::Synthesize, "synthesizer", err.to_string(), false, started.elapsed());
                trace.strategy = Strategy::Delegate;
                return self.run_delegate(objective, trace).await;
            }
        };
        trace.tools_created.push(spec.name.clone());
        trace.push(EngineState::Synthesize, "synthesizer", format!("created tool '{}'", spec.name), true, started.elapsed());

        if !trace.try_spend() {
            return Self::exhausted(trace);
        }
        let started = Instant::now();
        let input = serde_json::json!({ "objective": objective.text() });
        match self.toolkit.registry.invoke(&spec.name, input).await {
            Ok(output) if output.success => {
                trace.push(EngineState::Synthesize, spec.name.clone(), output.summary.clone(), true, started.elapsed());
                Execution::new(output.summary, RunOutcome::Success)
            }
            Ok(output) => {
                trace.push(EngineState::Synthesize, spec.name.clone(), output.summary.clone(), false, started.elapsed());
                Execution::new(output.summary, RunOutcome::Failure)
            }
            Err(e) => {
                trace.degrade(&e);
                trace.push(EngineState::Synthesize, spec.name.clone(), e.to_string(), false, started.elapsed());
                Execution::new(e.to_string(), RunOutcome::Failure)
            }
        }
    }

    async fn run_delegate(&self, objective: &Objective, trace: &mut ExecutionTrace) -> Execution {
        if !trace.try_spend() {
            return Self::exhausted(trace);
        }
        let started = Instant::now();
        let merged = match self.coordinator
            .delegate(DelegationContext::root(), objective, self.roster_size)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                trace.degrade(&e);
                trace.push(EngineState::Delegate, "coordinator", e.to_string(), false, started.elapsed());
                return Execution::new(e.to_string(), RunOutcome::Failure);
            }
        };

        trace.agents_spawned += merged.outcomes.len();
        trace.tools_created.extend(merged.tools_created());
        trace.learnings += merged.learnings();
        if let Some(err) = merged.partial_failure() {
            trace.degrade(&err);
        }

        let outcome = if merged.completed() == 0 {
            RunOutcome::Failure
        } else if merged.is_partial() {
            RunOutcome::Partial
        } else {
            RunOutcome::Success
        };
        trace.push(
            EngineState::Delegate,
            "coordinator",
            merged.summary.clone(),
            outcome != RunOutcome::Failure,
            started.elapsed(),
        );
        Execution::new(merged.summary, outcome)
    }

    /// Write the run's memory record and flush. Returns all learnings stored
    /// during the run, the run record included.
    async fn record(&self, objective: &Objective, execution: &Execution, trace: &mut ExecutionTrace) -> usize {
        let started = Instant::now();
        let summary = trace.outcome_summary(execution.outcome, &execution.answer);
        let tags = trace.tags(execution.outcome);
        let success = execution.outcome == RunOutcome::Success;

        let stored = match self.toolkit.memory.record_run(objective.text(), &summary, success, tags).await {
            Ok(true) => 1,
            Ok(false) => 0,
            Err(e) => {
                warn!("Run not recorded: {}", e);
                trace.degrade(&e);
                0
            }
        };
        if let Err(e) = self.toolkit.memory.close().await {
            warn!("Memory flush failed: {}", e);
            trace.degrade(&e);
        }
        trace.push(EngineState::Record, "memory", format!("{} record(s) stored", stored), stored > 0, started.elapsed());
        stored + trace.learnings
    }
}
