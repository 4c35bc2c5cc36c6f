//! Agent Error Types
//!
//! One taxonomy for the whole agency. Only configuration problems and
//! unrecoverable engine failures are surfaced to callers; every other
//! variant is recovered locally and recorded in the trace summary.

use thiserror::Error;

use crate::tools::{DuplicateNameError, SynthesisError};

/// Errors raised by the agency core
#[derive(Debug, Error)]
pub enum AgentError {
    /// Bad or missing settings or backend credentials. Fatal, raised before a run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The confidence assessor could not produce a judgment
    #[error("assessment degraded: {0}")]
    AssessmentDegraded(String),

    /// Tool generation or validation exhausted its attempts
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// Some sub-agent tasks failed or timed out
    #[error("delegation partially failed: {failed} of {total} tasks did not complete")]
    DelegationPartialFailure { failed: usize, total: usize },

    /// The memory backend is unreachable
    #[error("memory unavailable: {0}")]
    MemoryUnavailable(String),

    /// The step or time budget ran out
    #[error("budget exhausted after {steps} steps")]
    BudgetExhausted { steps: usize },

    /// A sub-agent attempted to delegate past the nesting cap
    #[error("delegation depth {depth} exceeds cap {cap}")]
    DelegationDepthExceeded { depth: u8, cap: u8 },

    #[error(transparent)]
    DuplicateName(#[from] DuplicateNameError),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the error must stop the run instead of degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Configuration(_) | AgentError::Validation(_))
    }

    /// Short, stable label used in trace summaries and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Configuration(_) => "configuration",
            AgentError::AssessmentDegraded(_) => "assessment_degraded",
            AgentError::Synthesis(_) => "synthesis",
            AgentError::DelegationPartialFailure { .. } => "delegation_partial_failure",
            AgentError::MemoryUnavailable(_) => "memory_unavailable",
            AgentError::BudgetExhausted { .. } => "budget_exhausted",
            AgentError::DelegationDepthExceeded { .. } => "delegation_depth_exceeded",
            AgentError::DuplicateName(_) => "duplicate_name",
            AgentError::Provider(_) => "provider",
            AgentError::Tool(_) => "tool",
            AgentError::Validation(_) => "validation",
            AgentError::Io(_) => "io",
            AgentError::Json(_) => "json",
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Provider(format!("{:#}", err))
    }
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AgentError::Configuration("missing key".into()).is_fatal());
        assert!(!AgentError::MemoryUnavailable("down".into()).is_fatal());
        assert!(!AgentError::BudgetExhausted { steps: 3 }.is_fatal());
        assert!(!AgentError::Tool("boom".into()).is_fatal());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = AgentError::DelegationPartialFailure { failed: 1, total: 3 };
        assert_eq!(err.to_string(), "delegation partially failed: 1 of 3 tasks did not complete");
        assert_eq!(err.kind(), "delegation_partial_failure");
    }
}
