//! Tool Synthesizer
//!
//! Asks the model for a small script, smoke-tests it, and registers it only
//! once it passes. Failed attempts feed their reason into the next prompt.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{info, warn};

use super::{save_tool, ScriptDefinition, ToolRegistry, ToolSpec, ValidationState, SUPPORTED_LANGUAGES};
use crate::agent::LLMProvider;
use crate::orchestrator::prompts;
use crate::utils::json_span;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SynthesisError {
    #[error("tool synthesis failed after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("malformed candidate: {0}")]
    InvalidCandidate(String),

    #[error("name '{0}' is already held by a validated tool")]
    NameTaken(String),

    #[error("smoke test failed: {0}")]
    SmokeTestFailed(String),

    #[error("model request failed: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmokeTest {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expect_contains: String,
}

/// What the model is asked to produce for one attempt
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisCandidate {
    pub name: String,
    pub description: String,
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub parameters: Value,
    pub smoke_test: SmokeTest,
}

impl SynthesisCandidate {
    pub fn parse(response: &str) -> Result<Self, SynthesisError> {
        let json = json_span(response, '{', '}')
            .ok_or_else(|| SynthesisError::InvalidCandidate("no JSON object in response".into()))?;
        let candidate: Self = serde_json::from_str(json)
            .map_err(|e| SynthesisError::InvalidCandidate(e.to_string()))?;
        candidate.check()?;
        Ok(candidate)
    }

    fn check(&self) -> Result<(), SynthesisError> {
        static NAME: OnceLock<Regex> = OnceLock::new();
        let name_re = NAME.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{1,63}$").expect("static regex"));

        if !name_re.is_match(&self.name) {
            return Err(SynthesisError::InvalidCandidate(format!(
                "name '{}' must be snake_case", self.name
            )));
        }
        if !SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            return Err(SynthesisError::InvalidCandidate(format!(
                "language '{}' is not one of {}", self.language, SUPPORTED_LANGUAGES.join(", ")
            )));
        }
        if self.code.trim().is_empty() {
            return Err(SynthesisError::InvalidCandidate("code is empty".into()));
        }
        Ok(())
    }

    fn script(&self) -> ScriptDefinition {
        ScriptDefinition {
            language: self.language.clone(),
            code: self.code.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

pub struct ToolSynthesizer {
    provider: Arc<dyn LLMProvider>,
    model: String,
    registry: Arc<ToolRegistry>,
    max_attempts: usize,
    tools_dir: Option<PathBuf>,
}

impl ToolSynthesizer {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            registry,
            max_attempts: 3,
            tools_dir: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Persist passing tools as `<dir>/<name>.json`
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = Some(dir.into());
        self
    }

    /// Produce, validate and register a tool for `sub_objective`
    pub async fn synthesize(&self, sub_objective: &str) -> Result<ToolSpec, SynthesisError> {
        let mut feedback: Vec<String> = Vec::new();

        for attempt in 1..=self.max_attempts {
            match self.attempt(sub_objective, &feedback).await {
                Ok(spec) => {
                    info!("Synthesized tool '{}' on attempt {}", spec.name, attempt);
                    return Ok(spec);
                }
                Err(e) => {
                    warn!("Synthesis attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    feedback.push(format!("Attempt {}: {}", attempt, e));
                }
            }
        }

        Err(SynthesisError::Exhausted {
            attempts: self.max_attempts,
            last: feedback.last().cloned().unwrap_or_default(),
        })
    }

    async fn attempt(&self, sub_objective: &str, feedback: &[String]) -> Result<ToolSpec, SynthesisError> {
        let existing = self.registry.tool_names().await;
        let prompt = prompts::synthesis_prompt(sub_objective, &existing, feedback);
        let response = self.provider
            .generate(&self.model, prompt, Some(prompts::SYNTHESIS_SYSTEM.to_string()))
            .await
            .map_err(|e| SynthesisError::Provider(format!("{:#}", e)))?;

        let candidate = SynthesisCandidate::parse(&response)?;
        if self.registry.lookup(&candidate.name).await.is_some_and(|s| s.is_passed()) {
            return Err(SynthesisError::NameTaken(candidate.name));
        }

        let script = candidate.script();
        let output = self.registry.runner()
            .run(&script, &candidate.smoke_test.input)
            .await
            .map_err(|e| SynthesisError::SmokeTestFailed(e.to_string()))?;

        if !output.success {
            return Err(SynthesisError::SmokeTestFailed(output.summary));
        }
        let expected = candidate.smoke_test.expect_contains.trim();
        if !expected.is_empty() && !output.summary.contains(expected) {
            return Err(SynthesisError::SmokeTestFailed(format!(
                "expected output containing '{}', got '{}'", expected, output.summary
            )));
        }

        let spec = ToolSpec::synthesized(candidate.name.clone(), candidate.description.clone(), script)
            .with_state(ValidationState::Passed);
        self.registry.register(spec.clone()).await
            .map_err(|e| SynthesisError::NameTaken(e.name))?;

        if let Some(dir) = &self.tools_dir {
            if let Err(e) = save_tool(dir, &spec) {
                warn!("Tool '{}' registered but not persisted: {:#}", spec.name, e);
            }
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentResult;
    use crate::tools::{ScriptRunner, ToolOutput};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.prompts.lock().await.push(prompt);
            Ok(self.replies.lock().await.pop_front().unwrap_or_default())
        }
    }

    /// Treats the script code as its own stdout; "fail" exits non-zero
    struct FakeRunner;

    #[async_trait]
    impl ScriptRunner for FakeRunner {
        async fn run(&self, script: &ScriptDefinition, _input: &Value) -> AgentResult<ToolOutput> {
            if script.code == "fail" {
                Ok(ToolOutput::failure("exit 1"))
            } else {
                Ok(ToolOutput::success_str(script.code.clone()))
            }
        }
    }

    fn candidate(name: &str, code: &str, expect: &str) -> String {
        format!(
            r#"Here you go:
{{"name": "{}", "description": "d", "language": "python", "code": "{}",
  "parameters": {{"type": "object"}}, "smoke_test": {{"input": {{}}, "expect_contains": "{}"}}}}"#,
            name, code, expect
        )
    }

    #[tokio::test]
    async fn test_passing_candidate_is_registered() {
        let registry = Arc::new(ToolRegistry::new(Arc::new(FakeRunner)));
        let provider = Arc::new(ScriptedProvider::new(&[&candidate("celsius", "21.5", "21")]));
        let synth = ToolSynthesizer::new(provider, "m", registry.clone());

        let spec = synth.synthesize("convert temperatures").await.unwrap();
        assert_eq!(spec.name, "celsius");
        assert!(registry.lookup("celsius").await.unwrap().is_passed());
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_attempt() {
        let registry = Arc::new(ToolRegistry::new(Arc::new(FakeRunner)));
        let provider = Arc::new(ScriptedProvider::new(&[
            "not json at all",
            &candidate("celsius", "fail", ""),
            &candidate("celsius", "ok", "ok"),
        ]));
        let synth = ToolSynthesizer::new(provider.clone(), "m", registry.clone());

        synth.synthesize("convert").await.unwrap();
        let prompts = provider.prompts.lock().await;
        assert_eq!(prompts.len(), 3);
        assert!(prompts[1].contains("no JSON object"));
        assert!(prompts[2].contains("smoke test failed"));
    }

    #[tokio::test]
    async fn test_exhaustion_registers_nothing() {
        let registry = Arc::new(ToolRegistry::new(Arc::new(FakeRunner)));
        let bad = candidate("celsius", "fail", "");
        let provider = Arc::new(ScriptedProvider::new(&[&bad, &bad, &bad]));
        let synth = ToolSynthesizer::new(provider, "m", registry.clone());

        let err = synth.synthesize("convert").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Exhausted { attempts: 3, .. }));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_taken_name_is_a_failed_attempt() {
        let registry = Arc::new(ToolRegistry::new(Arc::new(FakeRunner)));
        let held = ToolSpec::synthesized("celsius", "", ScriptDefinition {
            language: "python".into(), code: "x".into(), parameters: Value::Null,
        }).with_state(ValidationState::Passed);
        registry.register(held).await.unwrap();

        let provider = Arc::new(ScriptedProvider::new(&[&candidate("celsius", "ok", "")]));
        let synth = ToolSynthesizer::new(provider, "m", registry).with_max_attempts(1);
        let err = synth.synthesize("convert").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Exhausted { ref last, .. } if last.contains("already held")));
    }

    #[test]
    fn test_candidate_validation() {
        assert!(SynthesisCandidate::parse(&candidate("Bad Name", "x", "")).is_err());
        let wrong_lang = candidate("ok_name", "x", "").replace("python", "cobol");
        assert!(SynthesisCandidate::parse(&wrong_lang).is_err());
    }
}
