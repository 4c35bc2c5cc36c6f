//! Confidence Assessment
//!
//! Scores how likely the agency is to solve an objective with what it has
//! right now. The router only ever sees the resulting number.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::{AgentResult, LLMProvider};
use crate::memory::ScoredRecord;
use crate::orchestrator::{prompts, Objective};
use crate::tools::ToolSpec;

const EMPTY_RATIONALE: &str = "no rationale given";

/// A finite score in [0, 1] with a non-empty rationale
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceScore {
    pub value: f32,
    pub rationale: String,
    /// Set when the assessor fell back to its conservative default
    pub degraded: bool,
}

impl ConfidenceScore {
    pub fn new(value: f32, rationale: impl Into<String>) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let rationale = rationale.into();
        let rationale = if rationale.trim().is_empty() { EMPTY_RATIONALE.to_string() } else { rationale };
        Self { value, rationale, degraded: false }
    }

    pub fn degraded(value: f32, reason: impl Into<String>) -> Self {
        Self { degraded: true, ..Self::new(value, reason) }
    }
}

#[async_trait]
pub trait ConfidenceAssessor: Send + Sync {
    /// Read-only. An `Err` is treated as unrecoverable by the engine.
    async fn assess(
        &self,
        objective: &Objective,
        memories: &[ScoredRecord],
        tools: &[ToolSpec],
    ) -> AgentResult<ConfidenceScore>;
}

/// Deterministic scoring from memory similarity, tool coverage and objective shape
pub struct HeuristicAssessor {
    prior: f32,
}

impl HeuristicAssessor {
    pub fn new() -> Self {
        Self { prior: 0.6 }
    }

    fn keywords(text: &str) -> HashSet<String> {
        const STOP: &[&str] = &["the", "and", "then", "with", "for", "from", "into", "that", "this", "what", "about"];
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !STOP.contains(w))
            .map(|w| w.to_string())
            .collect()
    }

    fn clause_count(text: &str) -> usize {
        let lower = text.to_lowercase();
        lower.split(';')
            .flat_map(|part| part.split(" then "))
            .flat_map(|part| part.split(" and "))
            .filter(|part| !part.trim().is_empty())
            .count()
    }

    fn tool_coverage(objective: &str, tools: &[ToolSpec]) -> f32 {
        let wanted = Self::keywords(objective);
        if wanted.is_empty() {
            return 0.0;
        }
        let offered: HashSet<String> = tools.iter()
            .flat_map(|t| {
                let mut words = Self::keywords(&t.name.replace('_', " "));
                words.extend(Self::keywords(&t.description));
                words
            })
            .collect();
        wanted.intersection(&offered).count() as f32 / wanted.len() as f32
    }
}

impl Default for HeuristicAssessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfidenceAssessor for HeuristicAssessor {
    async fn assess(
        &self,
        objective: &Objective,
        memories: &[ScoredRecord],
        tools: &[ToolSpec],
    ) -> AgentResult<ConfidenceScore> {
        let mut score = self.prior;
        let mut notes = vec![format!("prior {:.2}", self.prior)];

        let best_success = memories.iter()
            .filter(|(r, _)| r.success)
            .map(|(_, s)| *s)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));
        if let Some(s) = best_success {
            let lifted = 0.5 + 0.5 * s;
            if lifted > score {
                score = lifted;
                notes.push(format!("similar success ({:.2})", s));
            }
        }

        let worst_failure = memories.iter()
            .filter(|(r, s)| !r.success && *s > 0.8)
            .map(|(_, s)| *s)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));
        if let Some(s) = worst_failure {
            score -= 0.3 * s;
            notes.push(format!("similar failure ({:.2})", s));
        }

        let coverage = Self::tool_coverage(objective.text(), tools);
        if coverage > 0.0 {
            score += 0.1 * coverage;
            notes.push(format!("tool coverage {:.0}%", coverage * 100.0));
        }

        let clauses = Self::clause_count(objective.text());
        if clauses > 2 {
            score -= 0.1 * (clauses - 2) as f32;
            notes.push(format!("{} clauses", clauses));
        }

        Ok(ConfidenceScore::new(score, notes.join(", ")))
    }
}

/// Asks the model to rate itself. Never fails: unusable replies degrade to a low score.
pub struct LlmAssessor {
    provider: Arc<dyn LLMProvider>,
    model: String,
    degraded_score: f32,
}

impl LlmAssessor {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self { provider, model: model.into(), degraded_score: 0.3 }
    }

    pub fn with_degraded_score(mut self, value: f32) -> Self {
        self.degraded_score = value;
        self
    }

    /// Parse `CONFIDENCE: <n>` and `RATIONALE: ...`. Percentages are accepted.
    pub fn parse(response: &str) -> Option<ConfidenceScore> {
        static CONFIDENCE: OnceLock<Regex> = OnceLock::new();
        static RATIONALE: OnceLock<Regex> = OnceLock::new();
        let conf_re = CONFIDENCE.get_or_init(|| {
            Regex::new(r"(?i)CONFIDENCE:\s*\**\s*([0-9]*\.?[0-9]+)\s*(%?)").expect("static regex")
        });
        let rat_re = RATIONALE.get_or_init(|| Regex::new(r"(?is)RATIONALE:\s*(.+)").expect("static regex"));

        let caps = conf_re.captures(response)?;
        let mut value: f32 = caps.get(1)?.as_str().parse().ok()?;
        let percent = caps.get(2).is_some_and(|m| !m.as_str().is_empty());
        if percent || (value > 1.0 && value <= 100.0) {
            value /= 100.0;
        }
        if value > 1.0 {
            return None;
        }

        let rationale = rat_re.captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        Some(ConfidenceScore::new(value, rationale))
    }
}

#[async_trait]
impl ConfidenceAssessor for LlmAssessor {
    async fn assess(
        &self,
        objective: &Objective,
        memories: &[ScoredRecord],
        tools: &[ToolSpec],
    ) -> AgentResult<ConfidenceScore> {
        let prompt = prompts::assessment_prompt(objective, memories, tools);
        let response = match self.provider
            .generate(&self.model, prompt, Some(prompts::ASSESSMENT_SYSTEM.to_string()))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Confidence assessment degraded: provider failed: {:#}", e);
                return Ok(ConfidenceScore::degraded(
                    self.degraded_score,
                    format!("assessment unavailable: {:#}", e),
                ));
            }
        };

        match Self::parse(&response) {
            Some(score) => {
                debug!("Assessed confidence {:.2}: {}", score.value, score.rationale);
                Ok(score)
            }
            None => {
                warn!("Confidence assessment degraded: unparsable reply");
                Ok(ConfidenceScore::degraded(self.degraded_score, "assessment reply could not be parsed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRecord;

    struct FixedProvider(anyhow::Result<String>);

    #[async_trait]
    impl LLMProvider for FixedProvider {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    fn objective(text: &str) -> Objective {
        Objective::new(text).unwrap()
    }

    #[test]
    fn test_score_is_clamped_and_finite() {
        assert_eq!(ConfidenceScore::new(1.7, "x").value, 1.0);
        assert_eq!(ConfidenceScore::new(-0.2, "x").value, 0.0);
        assert_eq!(ConfidenceScore::new(f32::NAN, "x").value, 0.0);
        assert_eq!(ConfidenceScore::new(0.5, "  ").rationale, EMPTY_RATIONALE);
    }

    #[test]
    fn test_parse_reply() {
        let s = LlmAssessor::parse("CONFIDENCE: 0.85\nRATIONALE: simple lookup").unwrap();
        assert!((s.value - 0.85).abs() < 1e-6);
        assert_eq!(s.rationale, "simple lookup");

        let pct = LlmAssessor::parse("confidence: 70%").unwrap();
        assert!((pct.value - 0.7).abs() < 1e-6);
        assert!(LlmAssessor::parse("I feel good about it").is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_degrades() {
        let assessor = LlmAssessor::new(Arc::new(FixedProvider(Err(anyhow::anyhow!("offline")))), "m");
        let score = assessor.assess(&objective("do it"), &[], &[]).await.unwrap();
        assert!(score.degraded);
        assert!((score.value - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_garbage_reply_degrades() {
        let assessor = LlmAssessor::new(Arc::new(FixedProvider(Ok("no idea".into()))), "m");
        let score = assessor.assess(&objective("do it"), &[], &[]).await.unwrap();
        assert!(score.degraded);
    }

    #[tokio::test]
    async fn test_heuristic_prior() {
        let score = HeuristicAssessor::new().assess(&objective("write a poem"), &[], &[]).await.unwrap();
        assert!((score.value - 0.6).abs() < 1e-6);
        assert!(!score.degraded);
    }

    #[tokio::test]
    async fn test_heuristic_memory_effects() {
        let ok = MemoryRecord::new("a", vec![], "done", true);
        let failed = MemoryRecord::new("b", vec![], "broke", false);

        let lifted = HeuristicAssessor::new()
            .assess(&objective("write a poem"), &[(ok.clone(), 0.9)], &[])
            .await.unwrap();
        assert!((lifted.value - 0.95).abs() < 1e-6);

        let lowered = HeuristicAssessor::new()
            .assess(&objective("write a poem"), &[(failed, 0.9)], &[])
            .await.unwrap();
        assert!((lowered.value - 0.33).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_heuristic_penalizes_compound_objectives() {
        let score = HeuristicAssessor::new()
            .assess(&objective("fetch prices and clean them then chart them; email the chart"), &[], &[])
            .await.unwrap();
        assert!((score.value - 0.4).abs() < 1e-6);
    }
}
