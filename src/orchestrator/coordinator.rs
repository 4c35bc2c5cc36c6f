//! Agent Coordinator (Swarm)
//!
//! Decomposes an objective into role-tagged sub-tasks, runs one sub-agent per
//! task concurrently, and merges the results in roster order.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use super::{prompts, Objective};
use crate::agent::{AgentError, AgentResult, AgentRole, SubAgent, Toolkit, WorkerReport};
use crate::config::SwarmConfig;
use crate::utils::{json_span, truncate_text, TruncationPolicy};

/// Deepest delegation level. The top-level run is depth 0, its sub-agents depth 1.
pub const MAX_DELEGATION_DEPTH: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationContext {
    depth: u8,
}

impl DelegationContext {
    pub fn root() -> Self {
        Self { depth: 0 }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Context for the next level down, refused past the cap
    pub fn descend(&self) -> AgentResult<Self> {
        if self.depth >= MAX_DELEGATION_DEPTH {
            return Err(AgentError::DelegationDepthExceeded {
                depth: self.depth + 1,
                cap: MAX_DELEGATION_DEPTH,
            });
        }
        Ok(Self { depth: self.depth + 1 })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub index: usize,
    pub role: AgentRole,
    pub sub_objective: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    TimedOut,
}

/// One roster slot's result, completed or not
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub index: usize,
    pub role: AgentRole,
    pub sub_objective: String,
    pub status: TaskStatus,
    pub output: String,
    pub steps: usize,
    pub tools_created: Vec<String>,
    pub learnings: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedTask {
    pub index: usize,
    pub role: AgentRole,
    pub status: TaskStatus,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MergedResult {
    /// Every task in roster order, placeholders included
    pub outcomes: Vec<TaskOutcome>,
    pub failures: Vec<FailedTask>,
    pub summary: String,
}

impl MergedResult {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.outcomes.len() - self.failures.len()
    }

    pub fn partial_failure(&self) -> Option<AgentError> {
        self.is_partial().then(|| AgentError::DelegationPartialFailure {
            failed: self.failures.len(),
            total: self.outcomes.len(),
        })
    }

    pub fn tools_created(&self) -> Vec<String> {
        self.outcomes.iter().flat_map(|o| o.tools_created.iter().cloned()).collect()
    }

    pub fn learnings(&self) -> usize {
        self.outcomes.iter().map(|o| o.learnings).sum()
    }

    fn merge(outcomes: Vec<TaskOutcome>) -> Self {
        let failures: Vec<FailedTask> = outcomes.iter()
            .filter(|o| o.status != TaskStatus::Completed)
            .map(|o| FailedTask { index: o.index, role: o.role, status: o.status, reason: o.output.clone() })
            .collect();

        let mut summary = String::new();
        for o in &outcomes {
            let label = match o.status {
                TaskStatus::Completed => "completed",
                TaskStatus::Failed => "failed",
                TaskStatus::TimedOut => "timed out",
            };
            summary.push_str(&format!(
                "[{}] {} ({}): {}\n{}\n\n",
                o.index + 1,
                o.role,
                label,
                o.sub_objective,
                truncate_text(&o.output, TruncationPolicy::Bytes(2000))
            ));
        }
        if !failures.is_empty() {
            summary.push_str(&format!(
                "Note: {} of {} sub-tasks did not complete; this result is partial.\n",
                failures.len(),
                outcomes.len()
            ));
        }

        Self { outcomes, failures, summary: summary.trim_end().to_string() }
    }
}

/// Aborts every spawned task if the delegation is dropped mid-flight
struct TaskSet<T>(Vec<JoinHandle<T>>);

impl<T> Drop for TaskSet<T> {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

enum TaskResult {
    Completed(WorkerReport),
    Failed(String),
    TimedOut,
}

pub struct AgentCoordinator {
    toolkit: Toolkit,
    config: SwarmConfig,
    semaphore: Arc<Semaphore>,
}

impl AgentCoordinator {
    pub fn new(toolkit: Toolkit, config: SwarmConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            toolkit,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// One decomposition pass. Falls back to a single generalist task.
    pub async fn decompose(&self, objective: &Objective, roster_size: usize) -> Vec<AgentTask> {
        let roster_size = roster_size.max(1);
        let tool_names = self.toolkit.registry.tool_names().await;
        let prompt = prompts::decomposition_prompt(objective, roster_size, &tool_names);

        let tasks = match self.toolkit.provider
            .generate(&self.toolkit.model, prompt, Some(prompts::DECOMPOSITION_SYSTEM.to_string()))
            .await
        {
            Ok(response) => Self::parse_tasks(&response, roster_size),
            Err(e) => {
                warn!("Decomposition failed: {:#}", e);
                Vec::new()
            }
        };

        if tasks.is_empty() {
            info!("Decomposition produced no tasks; using a single generalist");
            return vec![AgentTask {
                index: 0,
                role: AgentRole::Generalist,
                sub_objective: objective.text().to_string(),
                tools: Vec::new(),
            }];
        }
        tasks
    }

    fn parse_tasks(response: &str, roster_size: usize) -> Vec<AgentTask> {
        let Some(json) = json_span(response, '[', ']') else {
            return Vec::new();
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(json) else {
            return Vec::new();
        };

        items.iter()
            .filter_map(|v| {
                let sub_objective = v["sub_objective"].as_str()
                    .or_else(|| v["objective"].as_str())
                    .or_else(|| v["description"].as_str())
                    .or_else(|| v["desc"].as_str())?
                    .trim();
                if sub_objective.is_empty() {
                    return None;
                }
                let role = AgentRole::parse(v["role"].as_str().or_else(|| v["agent"].as_str()).unwrap_or(""));
                let tools = match &v["tools"] {
                    Value::Array(arr) => arr.iter().filter_map(|t| t.as_str()).map(|t| t.trim().to_string()).collect(),
                    Value::String(s) => s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty() && t != "none")
                        .collect(),
                    _ => Vec::new(),
                };
                Some((role, sub_objective.to_string(), tools))
            })
            .take(roster_size)
            .enumerate()
            .map(|(index, (role, sub_objective, tools))| AgentTask { index, role, sub_objective, tools })
            .collect()
    }

    /// Run the roster concurrently. Partial failure is reported in the
    /// merged result, never raised.
    #[instrument(skip(self, objective), fields(depth = ctx.depth()))]
    pub async fn delegate(
        &self,
        ctx: DelegationContext,
        objective: &Objective,
        roster_size: usize,
    ) -> AgentResult<MergedResult> {
        let child = ctx.descend()?;
        let tasks = self.decompose(objective, roster_size).await;
        info!("Delegating to {} sub-agents", tasks.len());

        let task_timeout = self.config.task_timeout();
        let mut set = TaskSet(Vec::with_capacity(tasks.len()));
        for task in &tasks {
            let agent = SubAgent::new(task.role, task.tools.clone(), self.toolkit.clone())
                .with_max_steps(self.config.worker_steps);
            let semaphore = self.semaphore.clone();
            let sub_objective = task.sub_objective.clone();

            set.0.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => return (TaskResult::Failed(e.to_string()), Duration::ZERO),
                };
                let started = Instant::now();
                let result = match timeout(task_timeout, agent.run(&child, &sub_objective)).await {
                    Ok(Ok(report)) => TaskResult::Completed(report),
                    Ok(Err(e)) => TaskResult::Failed(e.to_string()),
                    Err(_) => TaskResult::TimedOut,
                };
                (result, started.elapsed())
            }));
        }

        let joined = join_all(set.0.iter_mut()).await;

        let outcomes: Vec<TaskOutcome> = tasks.into_iter()
            .zip(joined)
            .map(|(task, joined)| {
                let (result, elapsed) = joined
                    .unwrap_or_else(|e| (TaskResult::Failed(format!("sub-agent crashed: {}", e)), Duration::ZERO));
                let (status, output, steps, tools_created, learnings) = match result {
                    TaskResult::Completed(r) => (TaskStatus::Completed, r.answer, r.steps, r.tools_created, r.learnings),
                    TaskResult::Failed(reason) => (TaskStatus::Failed, reason, 0, Vec::new(), 0),
                    TaskResult::TimedOut => (
                        TaskStatus::TimedOut,
                        format!("timed out after {}s", task_timeout.as_secs_f32()),
                        0,
                        Vec::new(),
                        0,
                    ),
                };
                if status != TaskStatus::Completed {
                    warn!("Sub-task {} ({}) {:?}: {}", task.index + 1, task.role, status, output);
                }
                TaskOutcome {
                    index: task.index,
                    role: task.role,
                    sub_objective: task.sub_objective,
                    status,
                    output,
                    steps,
                    tools_created,
                    learnings,
                    elapsed,
                }
            })
            .collect();

        Ok(MergedResult::merge(outcomes))
    }
}
