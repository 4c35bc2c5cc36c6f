//! Tool specifications
//!
//! A registry entry is either a compiled-in tool or a synthesized script.
//! Dispatch happens on the variant, never on a dynamic type check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Untested,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOrigin {
    Builtin,
    Synthesized,
}

/// Source of a synthesized tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDefinition {
    /// "python", "shell" or "node"
    pub language: String,
    pub code: String,
    /// JSON schema of the tool input
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Clone)]
pub enum ToolDefinition {
    Builtin(Arc<dyn Tool>),
    Synthesized(ScriptDefinition),
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolDefinition::Builtin(tool) => write!(f, "Builtin({})", tool.name()),
            ToolDefinition::Synthesized(script) => write!(f, "Synthesized({})", script.language),
        }
    }
}

/// Identity of one registered revision of a tool
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolId {
    pub name: String,
    pub revision: u32,
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub definition: ToolDefinition,
    pub validation_state: ValidationState,
    pub created_at: DateTime<Utc>,
    pub created_by: ToolOrigin,
}

impl ToolSpec {
    /// Wrap a compiled-in tool. Built-ins count as validated.
    pub fn builtin(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name(),
            description: tool.description(),
            definition: ToolDefinition::Builtin(tool),
            validation_state: ValidationState::Passed,
            created_at: Utc::now(),
            created_by: ToolOrigin::Builtin,
        }
    }

    pub fn synthesized(name: impl Into<String>, description: impl Into<String>, script: ScriptDefinition) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            definition: ToolDefinition::Synthesized(script),
            validation_state: ValidationState::Untested,
            created_at: Utc::now(),
            created_by: ToolOrigin::Synthesized,
        }
    }

    pub fn with_state(mut self, state: ValidationState) -> Self {
        self.validation_state = state;
        self
    }

    pub fn is_passed(&self) -> bool {
        self.validation_state == ValidationState::Passed
    }

    /// Input schema shown to the model
    pub fn parameters(&self) -> Value {
        match &self.definition {
            ToolDefinition::Builtin(tool) => tool.parameters(),
            ToolDefinition::Synthesized(script) => script.parameters.clone(),
        }
    }
}

/// On-disk form of a synthesized tool (`<tools_dir>/<name>.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTool {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub script: ScriptDefinition,
    pub validation_state: ValidationState,
    pub created_at: DateTime<Utc>,
}

impl PersistedTool {
    /// `None` for built-ins, which are never written to disk
    pub fn from_spec(spec: &ToolSpec) -> Option<Self> {
        match &spec.definition {
            ToolDefinition::Synthesized(script) => Some(Self {
                name: spec.name.clone(),
                description: spec.description.clone(),
                script: script.clone(),
                validation_state: spec.validation_state,
                created_at: spec.created_at,
            }),
            ToolDefinition::Builtin(_) => None,
        }
    }

    pub fn into_spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name,
            description: self.description,
            definition: ToolDefinition::Synthesized(self.script),
            validation_state: self.validation_state,
            created_at: self.created_at,
            created_by: ToolOrigin::Synthesized,
        }
    }
}
