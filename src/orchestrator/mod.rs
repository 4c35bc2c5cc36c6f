//! Orchestrator Module
//!
//! Objective handling, strategy routing, multi-agent delegation and the
//! top-level execution engine.

pub mod prompts;
mod objective;
mod router;
mod coordinator;
mod trace;
mod engine;

pub use objective::{Objective, Urgency};
pub use router::{RouterConfig, Strategy, StrategyRouter};
pub use coordinator::{
    AgentCoordinator, AgentTask, DelegationContext, FailedTask, MergedResult, TaskOutcome, TaskStatus,
    MAX_DELEGATION_DEPTH,
};
pub use trace::{EngineState, ExecutionTrace, RunOutcome, StepRecord, TraceSummary};
pub use engine::{ExecutionEngine, RunReport};
