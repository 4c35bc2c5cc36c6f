//! Prompt builders
//!
//! Plain string assembly. Each prompt opens with a `## ` heading naming the
//! phase so transcripts are easy to scan.

use crate::memory::ScoredRecord;
use crate::orchestrator::{Objective, Urgency};
use crate::tools::ToolSpec;
use crate::utils::{truncate_text, TruncationPolicy};

pub const ASSESSMENT_SYSTEM: &str =
    "You judge how likely an autonomous agent is to complete an objective with the \
     tools and experience it already has. Be calibrated, not optimistic.";

pub const SYNTHESIS_SYSTEM: &str =
    "You write small, self-contained command-line tools. Reply with a single JSON object and nothing else.";

pub const DIRECT_SYSTEM: &str =
    "You are a self-improving agent. Work step by step, use tools when they help, \
     and give a final answer as soon as you can.";

pub const DECOMPOSITION_SYSTEM: &str =
    "You split objectives into independent sub-tasks for specialist agents working in parallel.";

fn memories_block(memories: &[ScoredRecord]) -> String {
    if memories.is_empty() {
        return "No related past runs.\n".to_string();
    }
    memories.iter()
        .map(|(r, score)| format!(
            "- [{}] (similarity {:.2}) {}: {}\n",
            if r.success { "success" } else { "failure" },
            score,
            r.objective,
            truncate_text(&r.outcome_summary, TruncationPolicy::Bytes(300))
        ))
        .collect()
}

fn history_block(history: &[String]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Previous steps\n");
    for (i, h) in history.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, h));
    }
    out
}

const REPLY_FORMAT: &str = "Reply with exactly one of:\n\
ACTION: {\"tool\": \"<name>\", \"input\": {...}}\n\
ANSWER: <final answer>\n";

pub fn assessment_prompt(objective: &Objective, memories: &[ScoredRecord], tools: &[ToolSpec]) -> String {
    let tool_lines: String = tools.iter()
        .map(|t| format!("- {}: {}\n", t.name, t.description))
        .collect();
    format!(
        "## CONFIDENCE ASSESSMENT\n{}\n## Tools\n{}\n## Related past runs\n{}\n\
         Rate your confidence that the objective can be completed with these tools alone.\n\
         Reply in the form:\nCONFIDENCE: <number between 0 and 1>\nRATIONALE: <one or two sentences>\n",
        objective.format_for_prompt(),
        if tool_lines.is_empty() { "None\n".to_string() } else { tool_lines },
        memories_block(memories)
    )
}

pub fn synthesis_prompt(sub_objective: &str, existing_tools: &[String], feedback: &[String]) -> String {
    let mut prompt = format!(
        "## TOOL SYNTHESIS\nCapability needed: {}\n\n\
         Existing tools (do not reuse these names): {}\n\n\
         Write a tool as JSON with fields:\n\
         name (snake_case), description, language (python | shell | node), code, \
         parameters (JSON schema of the input), smoke_test {{ input, expect_contains }}.\n\
         The tool receives its input as a JSON string in the first command-line argument \
         and must print its result to stdout.\n",
        sub_objective,
        if existing_tools.is_empty() { "none".to_string() } else { existing_tools.join(", ") }
    );
    if !feedback.is_empty() {
        prompt.push_str("\n## Earlier attempts failed\n");
        for f in feedback {
            prompt.push_str(&format!("- {}\n", f));
        }
        prompt.push_str("Fix these problems in this attempt.\n");
    }
    prompt
}

pub fn direct_prompt(
    objective: &Objective,
    tools_prompt: &str,
    memories: &[ScoredRecord],
    history: &[String],
    step: usize,
    max_steps: usize,
) -> String {
    let urgency = Urgency::from_remaining(max_steps.saturating_sub(step));
    format!(
        "## DIRECT EXECUTION\n{}\n{}\n## Related past runs\n{}{}\n\
         Step {} of {} (urgency: {}).\n{}",
        objective.format_for_prompt(),
        tools_prompt,
        memories_block(memories),
        history_block(history),
        step,
        max_steps,
        urgency,
        REPLY_FORMAT
    )
}

pub fn decomposition_prompt(objective: &Objective, roster_size: usize, tool_names: &[String]) -> String {
    format!(
        "## DECOMPOSITION\n{}\n\
         Split this into at most {} independent sub-tasks that can run in parallel.\n\
         Roles: generalist, researcher, coder, analyst, planner, reviewer.\n\
         Available tools: {}\n\
         Reply with a JSON array only, e.g.\n\
         [{{\"role\": \"researcher\", \"sub_objective\": \"...\", \"tools\": [\"http_request\"]}}]\n",
        objective.format_for_prompt(),
        roster_size,
        tool_names.join(", ")
    )
}

pub fn worker_prompt(sub_objective: &str, tools_prompt: &str, memories: &[ScoredRecord], history: &[String]) -> String {
    format!(
        "## SUB-TASK\n{}\n\n{}\n## Related past runs\n{}{}\n{}\
         FORGE: <capability>  (ask for a new tool)\n",
        sub_objective,
        tools_prompt,
        memories_block(memories),
        history_block(history),
        REPLY_FORMAT
    )
}

pub fn think_prompt(thought: &str) -> String {
    format!("## THINK\nReason carefully about the following and state your conclusion.\n\n{}\n", thought)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_feedback_listed() {
        let p = synthesis_prompt("sum csv", &["think".into()], &["Attempt 1: bad json".into()]);
        assert!(p.contains("Attempt 1: bad json"));
        assert!(p.contains("think"));
    }

    #[test]
    fn test_direct_prompt_urgency() {
        let o = Objective::new("x").unwrap();
        assert!(direct_prompt(&o, "", &[], &[], 9, 10).contains("urgency: HIGH"));
        assert!(direct_prompt(&o, "", &[], &[], 1, 10).contains("urgency: LOW"));
    }
}
