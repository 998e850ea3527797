//! Agent findings.
//!
//! One finding is produced per agent invocation per round, including for
//! agents that failed, so that the audit trail shows who was excluded.

use crate::core::{now, Timestamp};
use serde::{Deserialize, Serialize};

/// Category of remediation an agent recommends.
///
/// Variants are ordered from most to least conservative; consensus ties are
/// broken towards the more conservative category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Hand to a human operator
    Escalate,
    /// Gather more data before acting
    Investigate,
    /// Keep watching, no change
    Monitor,
    /// Restart the affected component
    Restart,
    /// Add capacity
    Scale,
    /// Roll back the last change
    Rollback,
    /// Isolate the affected component
    Isolate,
}

impl std::fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionCategory::Escalate => "escalate",
            ActionCategory::Investigate => "investigate",
            ActionCategory::Monitor => "monitor",
            ActionCategory::Restart => "restart",
            ActionCategory::Scale => "scale",
            ActionCategory::Rollback => "rollback",
            ActionCategory::Isolate => "isolate",
        };
        f.write_str(s)
    }
}

/// What an agent concluded. Opaque to consensus beyond the recommended action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindingPayload {
    /// Diagnosis text
    pub diagnosis: String,
    /// Root-cause tag
    pub root_cause: Option<String>,
    /// Risk score reported by the agent
    pub risk_score: Option<f32>,
    /// Recommended remediation
    pub recommended_action: ActionCategory,
    /// Backend-specific details
    #[serde(default)]
    pub details: serde_json::Value,
}

impl FindingPayload {
    pub fn new(diagnosis: &str, recommended_action: ActionCategory) -> Self {
        Self {
            diagnosis: diagnosis.to_string(),
            root_cause: None,
            risk_score: None,
            recommended_action,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_root_cause(mut self, tag: &str) -> Self {
        self.root_cause = Some(tag.to_string());
        self
    }

    pub fn with_risk_score(mut self, score: f32) -> Self {
        self.risk_score = Some(score);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl Default for FindingPayload {
    fn default() -> Self {
        Self::new("", ActionCategory::Escalate)
    }
}

/// Result of a single agent invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentFinding {
    /// Agent that produced the finding
    pub agent_id: String,
    /// Finding payload
    pub payload: FindingPayload,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Invocation latency in milliseconds
    pub latency_ms: u64,
    /// Why the agent did not respond, if it did not
    pub failure: Option<String>,
    /// When the finding was recorded
    pub recorded_at: Timestamp,
}

impl AgentFinding {
    /// Create a successful finding. Confidence is clamped to [0, 1].
    pub fn new(agent_id: &str, payload: FindingPayload, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            confidence
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            agent_id: agent_id.to_string(),
            payload,
            confidence,
            latency_ms: 0,
            failure: None,
            recorded_at: now(),
        }
    }

    /// Record that an agent failed, timed out or was circuit-broken.
    pub fn failed(agent_id: &str, reason: &str, latency_ms: u64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            payload: FindingPayload::default(),
            confidence: 0.0,
            latency_ms,
            failure: Some(reason.to_string()),
            recorded_at: now(),
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Whether this finding counts as a vote.
    pub fn responded(&self) -> bool {
        self.failure.is_none() && self.confidence.is_finite()
    }
}
