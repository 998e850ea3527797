//! Consensus policy: autonomy threshold and quorum rule.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};

/// How many configured agents must respond for a decision to count as
/// multi-agent consensus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum QuorumRule {
    /// Strictly more than half of the configured agents
    Majority,
    /// At least this many responders
    AtLeast { responders: usize },
    /// All but the tolerated Byzantine fraction: n - floor(n * f)
    ByzantineTolerant { max_faulty_fraction: f64 },
}

impl QuorumRule {
    /// Responders required out of `configured` agents.
    pub fn required(&self, configured: usize) -> usize {
        match self {
            QuorumRule::Majority => configured / 2 + 1,
            QuorumRule::AtLeast { responders } => *responders,
            QuorumRule::ByzantineTolerant { max_faulty_fraction } => {
                let faulty = (configured as f64 * max_faulty_fraction).floor() as usize;
                configured.saturating_sub(faulty)
            }
        }
    }

    /// Whether `responded` of `configured` agents meets the rule.
    pub fn is_met(&self, responded: usize, configured: usize) -> bool {
        configured > 0 && responded > 0 && responded >= self.required(configured)
    }
}

impl Default for QuorumRule {
    fn default() -> Self {
        QuorumRule::Majority
    }
}

/// Consensus policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusPolicy {
    /// Weighted confidence needed for an autonomous decision
    pub min_confidence: f64,
    /// Quorum rule
    pub quorum: QuorumRule,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            quorum: QuorumRule::Majority,
        }
    }
}

impl ConsensusPolicy {
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_quorum(mut self, quorum: QuorumRule) -> Self {
        self.quorum = quorum;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(Error::InvalidConfig(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if let QuorumRule::ByzantineTolerant { max_faulty_fraction } = self.quorum {
            if !(0.0..0.5).contains(&max_faulty_fraction) {
                return Err(Error::InvalidConfig(format!(
                    "max_faulty_fraction must be within [0, 0.5), got {}",
                    max_faulty_fraction
                )));
            }
        }
        if let QuorumRule::AtLeast { responders: 0 } = self.quorum {
            return Err(Error::InvalidConfig("quorum of zero responders".into()));
        }
        Ok(())
    }
}
