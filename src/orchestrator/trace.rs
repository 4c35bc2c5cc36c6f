//! Execution trace of one run and its summary

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::Strategy;
use crate::agent::AgentError;
use crate::utils::{truncate_text, TruncationPolicy};

/// States of the engine's run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Init,
    Assess,
    Route,
    Direct,
    Synthesize,
    Delegate,
    Record,
    Done,
    Failed,
}

impl EngineState {
    /// Only execution states spend the step budget
    pub fn is_execution(&self) -> bool {
        matches!(self, EngineState::Direct | EngineState::Synthesize | EngineState::Delegate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Partial,
    Failure,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub state: EngineState,
    pub strategy: Option<Strategy>,
    pub actor: String,
    pub result: String,
    pub success: bool,
    pub elapsed: Duration,
}

/// Execution summary returned with every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps_taken: usize,
    pub max_steps: usize,
    pub strategy: Strategy,
    pub tools_created: Vec<String>,
    pub agents_spawned: usize,
    pub learnings_stored: usize,
    pub budget_exhausted: bool,
    pub timed_out: bool,
    pub degradations: Vec<String>,
    pub steps: Vec<String>,
}

impl std::fmt::Display for TraceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Strategy:         {}", self.strategy)?;
        writeln!(f, "Steps taken:      {}/{}", self.steps_taken, self.max_steps)?;
        writeln!(f, "Tools created:    {}", self.tools_created.len())?;
        writeln!(f, "Agents spawned:   {}", self.agents_spawned)?;
        writeln!(f, "Learnings stored: {}", self.learnings_stored)?;
        if self.budget_exhausted {
            writeln!(f, "Step budget exhausted")?;
        }
        if self.timed_out {
            writeln!(f, "Run timed out")?;
        }
        for d in &self.degradations {
            writeln!(f, "Degraded: {}", d)?;
        }
        Ok(())
    }
}

/// Grows during a run; summarized at RECORD and then dropped
#[derive(Debug)]
pub struct ExecutionTrace {
    steps: Vec<StepRecord>,
    max_steps: usize,
    pub strategy: Strategy,
    pub tools_created: Vec<String>,
    pub agents_spawned: usize,
    /// Learnings the agents saved through the memory tool
    pub learnings: usize,
    pub budget_exhausted: bool,
    pub timed_out: bool,
    degradations: Vec<String>,
}

impl ExecutionTrace {
    pub fn new(max_steps: usize, strategy: Strategy) -> Self {
        Self {
            steps: Vec::new(),
            max_steps,
            strategy,
            tools_created: Vec::new(),
            agents_spawned: 0,
            learnings: 0,
            budget_exhausted: false,
            timed_out: false,
            degradations: Vec::new(),
        }
    }

    pub fn steps_taken(&self) -> usize {
        self.steps.iter().filter(|s| s.state.is_execution()).count()
    }

    pub fn remaining(&self) -> usize {
        self.max_steps.saturating_sub(self.steps_taken())
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Checks the budget; marks the trace exhausted when none is left
    pub fn try_spend(&mut self) -> bool {
        if self.remaining() == 0 {
            self.budget_exhausted = true;
            return false;
        }
        true
    }

    pub fn push(
        &mut self,
        state: EngineState,
        actor: impl Into<String>,
        result: impl Into<String>,
        success: bool,
        elapsed: Duration,
    ) {
        let strategy = state.is_execution().then_some(self.strategy);
        self.steps.push(StepRecord {
            index: self.steps.len() + 1,
            state,
            strategy,
            actor: actor.into(),
            result: result.into(),
            success,
            elapsed,
        });
    }

    pub fn degrade(&mut self, err: &AgentError) {
        self.degradations.push(format!("{}: {}", err.kind(), err));
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Result of the most recent successful execution step
    pub fn last_result(&self) -> Option<&str> {
        self.steps.iter()
            .rev()
            .find(|s| s.success && s.state.is_execution())
            .map(|s| s.result.as_str())
    }

    /// Text stored as the run's memory record
    pub fn outcome_summary(&self, outcome: RunOutcome, answer: &str) -> String {
        let mut out = format!(
            "strategy={} outcome={} steps={}/{}",
            self.strategy, outcome.as_str(), self.steps_taken(), self.max_steps
        );
        if !self.tools_created.is_empty() {
            out.push_str(&format!(" tools={}", self.tools_created.join(",")));
        }
        if self.budget_exhausted {
            out.push_str(" budget_exhausted");
        }
        if self.timed_out {
            out.push_str(" timed_out");
        }
        out.push_str(&format!("\n{}", truncate_text(answer, TruncationPolicy::Bytes(1000))));
        out
    }

    pub fn tags(&self, outcome: RunOutcome) -> Vec<String> {
        let mut tags = vec![self.strategy.to_string(), outcome.as_str().to_string()];
        if self.budget_exhausted {
            tags.push("budget_exhausted".to_string());
        }
        if self.timed_out {
            tags.push("timed_out".to_string());
        }
        tags
    }

    pub fn summary(&self, learnings_stored: usize) -> TraceSummary {
        TraceSummary {
            steps_taken: self.steps_taken(),
            max_steps: self.max_steps,
            strategy: self.strategy,
            tools_created: self.tools_created.clone(),
            agents_spawned: self.agents_spawned,
            learnings_stored,
            budget_exhausted: self.budget_exhausted,
            timed_out: self.timed_out,
            degradations: self.degradations.clone(),
            steps: self.steps.iter()
                .map(|s| format!(
                    "{}. [{:?}] {} {}: {}",
                    s.index,
                    s.state,
                    s.actor,
                    if s.success { "ok" } else { "failed" },
                    truncate_text(&s.result, TruncationPolicy::Bytes(200))
                ))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_execution_steps_spend_budget() {
        let mut trace = ExecutionTrace::new(1, Strategy::Direct);
        trace.push(EngineState::Assess, "assessor", "0.9", true, Duration::ZERO);
        trace.push(EngineState::Route, "router", "direct", true, Duration::ZERO);
        assert!(trace.try_spend());
        trace.push(EngineState::Direct, "think", "hmm", true, Duration::ZERO);
        assert!(!trace.try_spend());
        assert!(trace.budget_exhausted);
        assert_eq!(trace.steps_taken(), 1);
    }

    #[test]
    fn test_summary_and_tags() {
        let mut trace = ExecutionTrace::new(5, Strategy::Synthesize);
        trace.tools_created.push("celsius".into());
        trace.degrade(&AgentError::MemoryUnavailable("down".into()));

        let summary = trace.summary(1);
        assert_eq!(summary.tools_created, vec!["celsius"]);
        assert!(summary.degradations[0].starts_with("memory_unavailable"));
        assert_eq!(trace.tags(RunOutcome::Success), vec!["synthesize", "success"]);
        assert!(trace.outcome_summary(RunOutcome::Success, "42").contains("tools=celsius"));
    }
}
