//! Objective and step urgency

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{AgentError, AgentResult};

/// The natural-language goal of one run. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context: Option<Value>,
}

impl Objective {
    /// Rejects empty or whitespace-only text
    pub fn new(text: impl Into<String>) -> AgentResult<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(AgentError::Validation("objective text is empty".to_string()));
        }
        Ok(Self { text: text.trim().to_string(), context: None })
    }

    pub fn with_context(text: impl Into<String>, context: Value) -> AgentResult<Self> {
        let mut objective = Self::new(text)?;
        objective.context = Some(context);
        Ok(objective)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn format_for_prompt(&self) -> String {
        match &self.context {
            Some(ctx) => format!("OBJECTIVE: {}\nCONTEXT: {}\n", self.text, ctx),
            None => format!("OBJECTIVE: {}\n", self.text),
        }
    }
}

/// How hard the model should push toward an answer, from the steps left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn from_remaining(remaining: usize) -> Self {
        if remaining < 3 {
            Urgency::High
        } else if remaining < 7 {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Urgency::Low => write!(f, "LOW"),
            Urgency::Medium => write!(f, "MEDIUM"),
            Urgency::High => write!(f, "HIGH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_objective_rejected() {
        assert!(matches!(Objective::new("   "), Err(AgentError::Validation(_))));
        assert_eq!(Objective::new("  plan a trip ").unwrap().text(), "plan a trip");
    }

    #[test]
    fn test_context_in_prompt() {
        let o = Objective::with_context("sum", json!({"values": [1, 2]})).unwrap();
        assert!(o.format_for_prompt().contains("CONTEXT"));
    }

    #[test]
    fn test_urgency_bands() {
        assert_eq!(Urgency::from_remaining(2), Urgency::High);
        assert_eq!(Urgency::from_remaining(3), Urgency::Medium);
        assert_eq!(Urgency::from_remaining(6), Urgency::Medium);
        assert_eq!(Urgency::from_remaining(7), Urgency::Low);
    }
}
