//! Decision produced by a consensus round.

use crate::agent::{ActionCategory, AgentFinding};
use crate::incident::DegradationTier;
use serde::{Deserialize, Serialize};

/// Note attached to decisions handed to a human because automation could
/// not reach a trustworthy answer.
pub const INSUFFICIENT_CONFIDENCE_NOTE: &str = "insufficient automated confidence";

/// Aggregated outcome of one consensus round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Weighted confidence over responding agents, in [0, 1]
    pub confidence: f64,
    /// Chosen remediation
    pub action: ActionCategory,
    /// True iff confidence met the threshold and quorum was met
    pub autonomous: bool,
    /// Whether enough agents responded, independent of confidence
    pub quorum_met: bool,
    /// Number of agents whose findings counted
    pub responded: usize,
    /// Number of agents configured for the round
    pub configured: usize,
    /// Findings that counted towards the decision
    pub contributing: Vec<AgentFinding>,
    /// Agents whose findings were excluded, with the reason
    pub excluded: Vec<ExcludedAgent>,
    /// Degradation tier that produced this decision
    pub tier: DegradationTier,
    /// Operator-facing note
    pub note: Option<String>,
}

/// An agent left out of consensus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedAgent {
    pub agent_id: String,
    pub reason: String,
}

impl Decision {
    /// Decision for a round in which nobody could be consulted.
    pub fn no_response(configured: usize) -> Self {
        Self {
            confidence: 0.0,
            action: ActionCategory::Escalate,
            autonomous: false,
            quorum_met: false,
            responded: 0,
            configured,
            contributing: Vec::new(),
            excluded: Vec::new(),
            tier: DegradationTier::Full,
            note: None,
        }
    }

    pub fn with_tier(mut self, tier: DegradationTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    /// Downgrade to a human-assisted decision, keeping the evidence.
    pub fn for_human(mut self) -> Self {
        self.autonomous = false;
        self.tier = DegradationTier::HumanAssisted;
        self.note = Some(INSUFFICIENT_CONFIDENCE_NOTE.to_string());
        self
    }

    /// Whether a single agent carried the decision.
    pub fn is_single_agent(&self) -> bool {
        self.responded == 1
    }

    /// Human-readable summary for logs and escalation tickets.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "{} with {:.0}% confidence ({}/{} agents responded)",
            self.action,
            self.confidence * 100.0,
            self.responded,
            self.configured
        )];

        if !self.quorum_met {
            parts.push("quorum not met".to_string());
        }
        if !self.excluded.is_empty() {
            let ids: Vec<&str> = self.excluded.iter().map(|e| e.agent_id.as_str()).collect();
            parts.push(format!("excluded: {}", ids.join(", ")));
        }
        parts.push(if self.autonomous {
            "autonomous".to_string()
        } else {
            "requires human".to_string()
        });
        if let Some(note) = &self.note {
            parts.push(note.clone());
        }

        parts.join(". ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_response_decision() {
        let decision = Decision::no_response(4);
        assert_eq!(decision.confidence, 0.0);
        assert!(!decision.autonomous);
        assert!(!decision.quorum_met);
        assert_eq!(decision.configured, 4);
    }

    #[test]
    fn test_for_human_tags_note() {
        let mut decision = Decision::no_response(3);
        decision.autonomous = true;
        let decision = decision.for_human();
        assert!(!decision.autonomous);
        assert_eq!(decision.tier, DegradationTier::HumanAssisted);
        assert_eq!(decision.note.as_deref(), Some(INSUFFICIENT_CONFIDENCE_NOTE));
    }

    #[test]
    fn test_summary_mentions_exclusions() {
        let mut decision = Decision::no_response(2);
        decision.excluded.push(ExcludedAgent {
            agent_id: "diagnosis".into(),
            reason: "timeout".into(),
        });
        let summary = decision.summary();
        assert!(summary.contains("quorum not met"));
        assert!(summary.contains("excluded: diagnosis"));
        assert!(summary.contains("requires human"));
    }
}
