//! Agent Module
//!
//! The model boundary, confidence assessment, the shared error taxonomy and
//! the sub-agent worker used by delegation.

mod error;
mod provider;
mod assessor;
mod react;
mod types;
mod worker;

pub use error::{AgentError, AgentResult};
pub use provider::{
    supports_thinking, LLMProvider, OllamaProvider, OpenAICompatibleProvider,
    DEFAULT_LOCAL_MODEL, DEFAULT_REMOTE_MODEL, THINKING_MODELS,
};
pub use assessor::{ConfidenceAssessor, ConfidenceScore, HeuristicAssessor, LlmAssessor};
pub use react::Reply;
pub use types::AgentRole;
pub use worker::{SubAgent, Toolkit, WorkerReport};
