use serde::{Deserialize, Serialize};

/// Specialisations a delegated sub-agent can take on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Generalist,
    Researcher,
    Coder,
    Analyst,
    Planner,
    Reviewer,
}

impl AgentRole {
    /// Parse the free-form role names a decomposition pass tends to produce
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "researcher" | "research" | "investigator" => AgentRole::Researcher,
            "coder" | "programmer" | "developer" | "engineer" => AgentRole::Coder,
            "analyst" | "analysis" | "data_analyst" => AgentRole::Analyst,
            "planner" | "planning" | "architect" => AgentRole::Planner,
            "reviewer" | "critic" | "verifier" => AgentRole::Reviewer,
            _ => AgentRole::Generalist,
        }
    }

    /// Tools a sub-agent of this role gets when the decomposition names none
    pub fn default_tools(&self) -> Vec<String> {
        let names: &[&str] = match self {
            AgentRole::Generalist => &["think", "memory_query", "memory_store", "current_time"],
            AgentRole::Researcher => &["http_request", "memory_query"],
            AgentRole::Coder => &["think", "shell", "python_repl"],
            AgentRole::Analyst => &["think", "memory_query", "python_repl"],
            AgentRole::Planner => &["think", "current_time"],
            AgentRole::Reviewer => &["think"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::Generalist =>
                "You are a capable generalist working on one part of a larger objective. \
                 Stay focused on your sub-objective and report a concrete result.",
            AgentRole::Researcher =>
                "You are a research specialist. Gather the facts your sub-objective needs, \
                 cite where they came from and keep the report short.",
            AgentRole::Coder =>
                "You are an expert programmer. Produce working code or exact command output, \
                 never placeholders.",
            AgentRole::Analyst =>
                "You are an analyst. Break the data or question down and state conclusions with numbers.",
            AgentRole::Planner =>
                "You are a planning specialist. Produce an ordered, actionable plan with dependencies.",
            AgentRole::Reviewer =>
                "You are a strict reviewer. Verify claims, flag anything unverified and say what is missing.",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Generalist => write!(f, "Generalist"),
            AgentRole::Researcher => write!(f, "Researcher"),
            AgentRole::Coder => write!(f, "Coder"),
            AgentRole::Analyst => write!(f, "Analyst"),
            AgentRole::Planner => write!(f, "Planner"),
            AgentRole::Reviewer => write!(f, "Reviewer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(AgentRole::parse("Researcher"), AgentRole::Researcher);
        assert_eq!(AgentRole::parse(" developer "), AgentRole::Coder);
        assert_eq!(AgentRole::parse("something else"), AgentRole::Generalist);
    }

    #[test]
    fn test_default_tools_are_named() {
        assert!(AgentRole::Researcher.default_tools().contains(&"http_request".to_string()));
        assert!(!AgentRole::Reviewer.default_tools().is_empty());
    }
}
