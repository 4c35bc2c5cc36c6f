//! ReAct reply parsing
//!
//! Models answer each step with one tagged line:
//! `ACTION: {"tool": ..., "input": {...}}`, `FORGE: <capability>`,
//! `DELEGATE: <objective>` or `ANSWER: <text>`. Anything else is a thought.

use crate::tools::ToolCall;

const TAGS: &[&str] = &["ACTION:", "FORGE:", "DELEGATE:", "ANSWER:", "THOUGHT:", "OBSERVATION:"];

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Action(ToolCall),
    Forge(String),
    Delegate(String),
    Answer(String),
    Thought(String),
}

impl Reply {
    pub fn parse(response: &str) -> Self {
        let text = response.trim();

        if let Some(body) = extract_tag(text, "ACTION:") {
            if let Some(call) = parse_json_tool_call(&body) {
                return Reply::Action(call);
            }
        }
        if let Some(body) = extract_tag(text, "FORGE:") {
            return Reply::Forge(body);
        }
        if let Some(body) = extract_tag(text, "DELEGATE:") {
            return Reply::Delegate(body);
        }
        if let Some(body) = extract_tag(text, "ANSWER:") {
            return Reply::Answer(body);
        }
        Reply::Thought(text.to_string())
    }
}

/// Text following `tag` up to the next known tag, case-insensitive
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let upper = text.to_uppercase();
    // Uppercasing can change byte lengths outside ASCII
    if upper.len() != text.len() {
        return text.find(tag).map(|i| text[i + tag.len()..].trim().to_string()).filter(|s| !s.is_empty());
    }

    let start = upper.find(tag)? + tag.len();
    let end = TAGS.iter()
        .filter_map(|t| upper[start..].find(t).map(|i| start + i))
        .min()
        .unwrap_or(text.len());

    let body = text[start..end].trim().trim_start_matches(['*', ':']).trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// First balanced JSON object in `text` that deserializes into a tool call
fn parse_json_tool_call(text: &str) -> Option<ToolCall> {
    let start = text.find('{')?;
    let json_text = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in json_text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let call: ToolCall = serde_json::from_str(&json_text[..=i]).ok()?;
                    return (!call.name.is_empty()).then_some(call);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_with_tool_and_input() {
        let reply = Reply::parse("THOUGHT: need the time\nACTION: {\"tool\": \"current_time\", \"input\": {\"utc_offset_hours\": 1}}");
        match reply {
            Reply::Action(call) => {
                assert_eq!(call.name, "current_time");
                assert_eq!(call.parameters, json!({"utc_offset_hours": 1}));
            }
            other => panic!("expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_braces_inside_strings() {
        let reply = Reply::parse(r#"ACTION: {"tool": "think", "input": {"thought": "a } b {"}}"#);
        assert!(matches!(reply, Reply::Action(ref c) if c.parameters["thought"] == "a } b {"));
    }

    #[test]
    fn test_answer_and_other_tags() {
        assert_eq!(Reply::parse("answer: 42"), Reply::Answer("42".into()));
        assert_eq!(Reply::parse("FORGE: csv column summer"), Reply::Forge("csv column summer".into()));
        assert_eq!(Reply::parse("DELEGATE: split it"), Reply::Delegate("split it".into()));
        assert!(matches!(Reply::parse("hmm"), Reply::Thought(_)));
    }

    #[test]
    fn test_malformed_action_falls_through_to_answer() {
        let reply = Reply::parse("ACTION: not json\nANSWER: done anyway");
        assert_eq!(reply, Reply::Answer("done anyway".into()));
    }
}
