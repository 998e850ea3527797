//! Orchestrator configuration.
//!
//! One serde document with a section per component. Loaded from JSON, then
//! optionally overridden from `BICO_*` environment variables, validated, and
//! frozen for the lifetime of the coordinator.

use crate::breaker::BreakerConfig;
use crate::consensus::{ConsensusPolicy, ConsensusWeights};
use crate::coordinator::{DegradationConfig, RoundConfig};
use crate::core::{Error, Result};
use crate::monitoring::LogConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ENV_MIN_CONFIDENCE: &str = "BICO_MIN_CONFIDENCE";
pub const ENV_BREAKER_FAILURE_THRESHOLD: &str = "BICO_BREAKER_FAILURE_THRESHOLD";
pub const ENV_BREAKER_COOLDOWN_SECS: &str = "BICO_BREAKER_COOLDOWN_SECS";
pub const ENV_ROUND_DEADLINE_MS: &str = "BICO_ROUND_DEADLINE_MS";
pub const ENV_AGENT_TIMEOUT_MS: &str = "BICO_AGENT_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "BICO_LOG_LEVEL";

/// Complete orchestrator configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Autonomy threshold and quorum rule
    pub consensus: ConsensusPolicy,
    /// Per-agent circuit breakers
    pub breaker: BreakerConfig,
    /// Round and resolution timing
    pub round: RoundConfig,
    /// Degradation ladder
    pub degradation: DegradationConfig,
    /// Event store backend and retries
    pub store: StoreConfig,
    /// Agent id to consensus weight
    pub weights: ConsensusWeights,
    /// Logging
    pub logging: LogConfig,
}

impl OrchestratorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&contents)
    }

    pub fn with_weights(mut self, weights: ConsensusWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by `BICO_*` variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_var(&lookup, ENV_MIN_CONFIDENCE)? {
            self.consensus.min_confidence = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BREAKER_FAILURE_THRESHOLD)? {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BREAKER_COOLDOWN_SECS)? {
            self.breaker.cooldown_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_ROUND_DEADLINE_MS)? {
            self.round.round_deadline_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_AGENT_TIMEOUT_MS)? {
            self.round.agent_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_LOG_LEVEL)? {
            self.logging.level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;
        self.weights.validate()?;
        self.round.validate()?;
        self.degradation.validate()?;
        self.store.validate()?;
        self.logging.validate()?;

        if self.breaker.failure_threshold == 0 {
            return Err(Error::InvalidConfig("breaker failure_threshold must be > 0".into()));
        }
        if self.breaker.call_timeout_ms == 0 {
            return Err(Error::InvalidConfig("breaker call_timeout_ms must be > 0".into()));
        }
        for agent in &self.degradation.critical_agents {
            if !self.weights.contains(agent) {
                return Err(Error::InvalidConfig(format!(
                    "critical agent {} has no consensus weight",
                    agent
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("{}={}: {}", key, raw, e))),
        None => Ok(None),
    }
}
