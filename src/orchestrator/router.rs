//! Strategy Router
//!
//! Pure mapping from a confidence score to an execution strategy.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agent::{AgentError, AgentResult, ConfidenceScore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Solve with the tools already registered
    Direct,
    /// Build a new tool first
    Synthesize,
    /// Split across parallel sub-agents
    Delegate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Synthesize => "synthesize",
            Strategy::Delegate => "delegate",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub high_threshold: f32,
    pub low_threshold: f32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { high_threshold: 0.80, low_threshold: 0.50 }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> AgentResult<()> {
        let (low, high) = (self.low_threshold, self.high_threshold);
        if !(low.is_finite() && high.is_finite()) || low < 0.0 || high > 1.0 || low > high {
            return Err(AgentError::Configuration(format!(
                "router thresholds must satisfy 0 <= low <= high <= 1 (low {}, high {})",
                low, high
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyRouter {
    config: RouterConfig,
}

impl StrategyRouter {
    pub fn new(config: RouterConfig) -> AgentResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    /// Boundary values go to the lower-effort strategy
    pub fn route(&self, score: &ConfidenceScore) -> Strategy {
        let strategy = if score.value >= self.config.high_threshold {
            Strategy::Direct
        } else if score.value >= self.config.low_threshold {
            Strategy::Synthesize
        } else {
            Strategy::Delegate
        };
        info!("Routing confidence {:.2} -> {}", score.value, strategy);
        strategy
    }
}

impl Default for StrategyRouter {
    fn default() -> Self {
        Self { config: RouterConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(value: f32) -> Strategy {
        StrategyRouter::default().route(&ConfidenceScore::new(value, "test"))
    }

    #[test]
    fn test_bands_and_boundaries() {
        assert_eq!(route(0.95), Strategy::Direct);
        assert_eq!(route(0.80), Strategy::Direct);
        assert_eq!(route(0.79), Strategy::Synthesize);
        assert_eq!(route(0.50), Strategy::Synthesize);
        assert_eq!(route(0.49), Strategy::Delegate);
        assert_eq!(route(0.0), Strategy::Delegate);
    }

    #[test]
    fn test_monotonic() {
        let rank = |s: Strategy| match s {
            Strategy::Delegate => 0,
            Strategy::Synthesize => 1,
            Strategy::Direct => 2,
        };
        let mut last = 0;
        for i in 0..=100 {
            let r = rank(route(i as f32 / 100.0));
            assert!(r >= last);
            last = r;
        }
    }

    #[test]
    fn test_invalid_thresholds() {
        let bad = RouterConfig { high_threshold: 0.4, low_threshold: 0.6 };
        assert!(matches!(StrategyRouter::new(bad), Err(AgentError::Configuration(_))));
        let out_of_range = RouterConfig { high_threshold: 1.2, low_threshold: 0.5 };
        assert!(out_of_range.validate().is_err());
    }
}
