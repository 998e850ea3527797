//! Weighted Byzantine-tolerant consensus.
//!
//! Confidence is `Σ(w·c) / Σ(w)` over agents that responded. Failed, slow or
//! unknown agents drop out of both sums instead of counting as zero, so losing
//! an agent removes its vote without dragging the result below threshold.
//!
//! Everything here is a pure function of its inputs.

use crate::agent::{ActionCategory, AgentFinding};
use crate::consensus::decision::{Decision, ExcludedAgent};
use crate::consensus::quorum::ConsensusPolicy;
use crate::consensus::weights::ConsensusWeights;
use crate::incident::DegradationTier;
use std::collections::{BTreeMap, HashSet};

const SUPPORT_EPSILON: f64 = 1e-12;

/// Consensus engine bound to a policy.
#[derive(Clone, Debug, Default)]
pub struct ConsensusEngine {
    policy: ConsensusPolicy,
}

impl ConsensusEngine {
    pub fn new(policy: ConsensusPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    /// Aggregate findings using this engine's policy.
    pub fn decide(&self, findings: &[AgentFinding], weights: &ConsensusWeights) -> Decision {
        build_consensus(findings, weights, &self.policy)
    }
}

/// Aggregate agent findings into a decision.
///
/// Only the first responding finding per agent counts; agents missing from
/// `weights` are excluded. With no responders, or no responding weight, the
/// confidence is 0 and the decision is never autonomous.
pub fn build_consensus(
    findings: &[AgentFinding],
    weights: &ConsensusWeights,
    policy: &ConsensusPolicy,
) -> Decision {
    let configured = weights.len();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut contributing = Vec::new();
    let mut excluded = Vec::new();

    let mut weighted_sum = 0.0_f64;
    let mut weight_sum = 0.0_f64;
    let mut support: BTreeMap<ActionCategory, f64> = BTreeMap::new();

    for finding in findings {
        let reason = if let Some(failure) = &finding.failure {
            Some(failure.clone())
        } else if !finding.confidence.is_finite() {
            Some("non-finite confidence".to_string())
        } else if !weights.contains(&finding.agent_id) {
            Some("agent has no configured weight".to_string())
        } else if seen.contains(finding.agent_id.as_str()) {
            Some("duplicate finding".to_string())
        } else {
            None
        };

        if let Some(reason) = reason {
            excluded.push(ExcludedAgent {
                agent_id: finding.agent_id.clone(),
                reason,
            });
            continue;
        }

        seen.insert(finding.agent_id.as_str());
        let weight = weights.get(&finding.agent_id).unwrap_or(0.0) as f64;
        let confidence = (finding.confidence as f64).clamp(0.0, 1.0);

        weighted_sum += weight * confidence;
        weight_sum += weight;
        *support.entry(finding.payload.recommended_action).or_insert(0.0) += weight * confidence;
        contributing.push(finding.clone());
    }

    let responded = contributing.len();
    let confidence = if weight_sum > 0.0 {
        (weighted_sum / weight_sum).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let quorum_met = policy.quorum.is_met(responded, configured);
    let autonomous = responded > 0 && quorum_met && confidence >= policy.min_confidence;

    Decision {
        confidence,
        action: choose_action(&support),
        autonomous,
        quorum_met,
        responded,
        configured,
        contributing,
        excluded,
        tier: DegradationTier::Full,
        note: None,
    }
}

/// Action with the greatest weighted support; ties go to the more
/// conservative category, and no responders means escalate.
fn choose_action(support: &BTreeMap<ActionCategory, f64>) -> ActionCategory {
    let mut best: Option<(ActionCategory, f64)> = None;
    // BTreeMap iterates conservative-first, so only a strictly larger
    // support replaces the current pick.
    for (&action, &score) in support {
        match best {
            Some((_, top)) if score <= top + SUPPORT_EPSILON => {}
            _ => best = Some((action, score)),
        }
    }
    best.map(|(action, _)| action).unwrap_or(ActionCategory::Escalate)
}
