//! Static per-agent consensus weights.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping of agent id to weight in [0, 1].
///
/// Weights need not sum to 1; the engine normalizes over the agents that
/// actually responded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsensusWeights {
    weights: BTreeMap<String, f32>,
}

impl ConsensusWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pairs, rejecting invalid weights.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut weights = Self::new();
        for (agent, weight) in pairs {
            weights.insert(agent, weight)?;
        }
        Ok(weights)
    }

    /// Set the weight for an agent.
    pub fn insert(&mut self, agent: impl Into<String>, weight: f32) -> Result<()> {
        let agent = agent.into();
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(Error::InvalidConfig(format!(
                "weight for agent {} must be within [0, 1], got {}",
                agent, weight
            )));
        }
        self.weights.insert(agent, weight);
        Ok(())
    }

    pub fn get(&self, agent: &str) -> Option<f32> {
        self.weights.get(agent).copied()
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.weights.contains_key(agent)
    }

    /// Number of configured agents.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(|k| k.as_str())
    }

    pub fn total(&self) -> f64 {
        self.weights.values().map(|&w| w as f64).sum()
    }

    /// Weights restricted to the given agents.
    pub fn restricted_to(&self, agents: &[String]) -> Self {
        Self {
            weights: self
                .weights
                .iter()
                .filter(|(id, _)| agents.iter().any(|a| a == *id))
                .map(|(id, &w)| (id.clone(), w))
                .collect(),
        }
    }

    /// Re-check every weight; used after deserialization.
    pub fn validate(&self) -> Result<()> {
        for (agent, &weight) in &self.weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(Error::InvalidConfig(format!(
                    "weight for agent {} must be within [0, 1], got {}",
                    agent, weight
                )));
            }
        }
        Ok(())
    }
}
