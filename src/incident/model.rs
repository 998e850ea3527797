//! Incident severity, lifecycle and input types.

use crate::core::IncidentId;
use serde::{Deserialize, Serialize};

/// Incident severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Lifecycle state of an incident.
///
/// `Detected → Diagnosing → ConsensusPending → Resolving → Resolved`, with
/// `Escalated` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Incident recorded, no agents dispatched yet
    Detected,
    /// Agents running
    Diagnosing,
    /// Consensus evaluated, awaiting routing
    ConsensusPending,
    /// Autonomous resolution in progress
    Resolving,
    /// Resolution completed
    Resolved,
    /// Handed to a human operator
    Escalated,
}

impl LifecycleState {
    /// Whether the incident can move from `self` to `next`.
    ///
    /// A new round may be started from any state, which moves the incident
    /// back to `Diagnosing`; degraded tiers rely on this.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Detected, Diagnosing) => true,
            (Diagnosing, Diagnosing) => true,
            (Diagnosing, ConsensusPending) => true,
            (ConsensusPending, Resolving) => true,
            (ConsensusPending, Diagnosing) | (Resolving, Diagnosing) => true,
            (Resolving, Resolved) => true,
            (Resolved, Diagnosing) | (Escalated, Diagnosing) => true,
            (Resolved, _) => false,
            (Escalated, _) => false,
            (_, Escalated) => true,
            _ => false,
        }
    }

    /// Whether no further automatic transitions happen from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Resolved | LifecycleState::Escalated)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Detected => "detected",
            LifecycleState::Diagnosing => "diagnosing",
            LifecycleState::ConsensusPending => "consensus_pending",
            LifecycleState::Resolving => "resolving",
            LifecycleState::Resolved => "resolved",
            LifecycleState::Escalated => "escalated",
        };
        f.write_str(s)
    }
}

/// Service tier an incident is being handled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationTier {
    Full,
    CriticalSubset,
    HumanAssisted,
    Emergency,
}

impl DegradationTier {
    /// Higher is more degraded.
    pub fn severity(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::CriticalSubset => 1,
            Self::HumanAssisted => 2,
            Self::Emergency => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::CriticalSubset => "critical_subset",
            Self::HumanAssisted => "human_assisted",
            Self::Emergency => "emergency",
        }
    }

    /// The tier below this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Full => Some(Self::CriticalSubset),
            Self::CriticalSubset => Some(Self::HumanAssisted),
            Self::HumanAssisted => Some(Self::Emergency),
            Self::Emergency => None,
        }
    }

    /// Whether this tier runs an automated agent round.
    pub fn runs_agents(self) -> bool {
        matches!(self, Self::Full | Self::CriticalSubset)
    }
}

impl Default for DegradationTier {
    fn default() -> Self {
        Self::Full
    }
}

impl std::fmt::Display for DegradationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Input accepted by the coordinator to open (or re-run) an incident.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentInput {
    /// Existing incident id to re-run, or `None` to open a new incident
    pub id: Option<IncidentId>,
    /// Human-readable description
    pub description: String,
    /// Severity
    pub severity: Severity,
    /// Free-form signal data handed to the agents
    pub signals: serde_json::Value,
}

impl IncidentInput {
    /// Create input for a new incident.
    pub fn new(description: &str, severity: Severity) -> Self {
        Self {
            id: None,
            description: description.to_string(),
            severity,
            signals: serde_json::Value::Null,
        }
    }

    /// Target an existing incident.
    pub fn with_id(mut self, id: IncidentId) -> Self {
        self.id = Some(id);
        self
    }

    /// Attach signal data.
    pub fn with_signals(mut self, signals: serde_json::Value) -> Self {
        self.signals = signals;
        self
    }
}
