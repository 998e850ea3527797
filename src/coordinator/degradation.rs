//! Degradation ladder.
//!
//! When a round cannot produce a usable answer the coordinator walks down a
//! fixed ladder of tiers, each cheaper and less automated than the last:
//!
//! 1. `Full` - every registered agent, full round deadline.
//! 2. `CriticalSubset` - a configured subset, shorter deadline, and a minimum
//!    number of responders.
//! 3. `HumanAssisted` - no new round; the partial findings go to an operator.
//! 4. `Emergency` - out-of-band alert, coordination fails.

use crate::consensus::Decision;
use crate::core::{Error, Result};
use crate::incident::DegradationTier;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Degradation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Agents consulted in the critical-subset tier
    pub critical_agents: Vec<String>,
    /// Round deadline for the critical-subset tier
    pub critical_deadline_ms: u64,
    /// Responders required for the critical-subset tier to count
    pub critical_min_responders: usize,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            critical_agents: Vec::new(),
            critical_deadline_ms: 30_000,
            critical_min_responders: 2,
        }
    }
}

impl DegradationConfig {
    pub fn critical_deadline(&self) -> Duration {
        Duration::from_millis(self.critical_deadline_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.critical_deadline_ms == 0 {
            return Err(Error::InvalidConfig("critical deadline must be > 0".into()));
        }
        if self.critical_min_responders == 0 {
            return Err(Error::InvalidConfig(
                "critical_min_responders must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Decides which tier handles an incident next.
#[derive(Clone, Debug, Default)]
pub struct DegradationManager {
    config: DegradationConfig,
}

impl DegradationManager {
    pub fn new(config: DegradationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DegradationConfig {
        &self.config
    }

    /// Agents for an automated tier, filtered to those actually registered.
    ///
    /// Returns `None` for tiers that do not run agents, or when the critical
    /// subset has nobody to call.
    pub fn agents_for(&self, tier: DegradationTier, registered: &[String]) -> Option<Vec<String>> {
        match tier {
            DegradationTier::Full => Some(registered.to_vec()),
            DegradationTier::CriticalSubset => {
                let subset: Vec<String> = registered
                    .iter()
                    .filter(|id| self.config.critical_agents.contains(id))
                    .cloned()
                    .collect();
                if subset.is_empty() {
                    None
                } else {
                    Some(subset)
                }
            }
            DegradationTier::HumanAssisted | DegradationTier::Emergency => None,
        }
    }

    /// Round deadline for an automated tier.
    pub fn deadline_for(&self, tier: DegradationTier, full_deadline: Duration) -> Duration {
        match tier {
            DegradationTier::CriticalSubset => self.config.critical_deadline().min(full_deadline),
            _ => full_deadline,
        }
    }

    /// Whether a round's decision is usable at this tier, or the ladder must
    /// continue downwards.
    pub fn accepts(&self, tier: DegradationTier, decision: &Decision) -> bool {
        match tier {
            DegradationTier::Full => decision.responded > 0,
            DegradationTier::CriticalSubset => {
                decision.responded >= self.config.critical_min_responders
            }
            DegradationTier::HumanAssisted | DegradationTier::Emergency => false,
        }
    }

    /// Reason logged and recorded when entering `tier`.
    pub fn entry_reason(&self, tier: DegradationTier, previous: Option<&Decision>) -> String {
        let responded = previous.map(|d| d.responded).unwrap_or(0);
        match tier {
            DegradationTier::Full => "initial dispatch".to_string(),
            DegradationTier::CriticalSubset => {
                format!("full round unusable ({} responders)", responded)
            }
            DegradationTier::HumanAssisted => format!(
                "automated rounds unusable ({} responders, {} required)",
                responded, self.config.critical_min_responders
            ),
            DegradationTier::Emergency => "human-assisted hand-off failed".to_string(),
        }
    }
}
