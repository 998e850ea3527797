//! Agent interface definition.
//!
//! Any analyzer backend (LLM call, rule engine, human stub) plugs in by
//! implementing [`Agent`].

use crate::agent::finding::AgentFinding;
use crate::core::{IncidentId, Result};
use crate::incident::Severity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Read-only view of an incident handed to every agent in a round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentContext {
    /// Incident being analyzed
    pub incident_id: IncidentId,
    /// Description
    pub description: String,
    /// Severity
    pub severity: Severity,
    /// Signal data supplied with the incident
    pub signals: serde_json::Value,
    /// Consensus round number for this incident, starting at 1
    pub round: u32,
}

impl IncidentContext {
    pub fn new(incident_id: IncidentId, description: &str, severity: Severity) -> Self {
        Self {
            incident_id,
            description: description.to_string(),
            severity,
            signals: serde_json::Value::Null,
            round: 1,
        }
    }

    pub fn with_signals(mut self, signals: serde_json::Value) -> Self {
        self.signals = signals;
        self
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = round;
        self
    }
}

/// Agent trait that all analyzers must implement.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier, also the key into the consensus weights.
    fn id(&self) -> &str;

    /// Short description for health listings.
    fn description(&self) -> &str {
        ""
    }

    /// Analyze the incident. Implementations should give up by `deadline`;
    /// the coordinator cancels them after it regardless.
    async fn invoke(&self, ctx: &IncidentContext, deadline: Instant) -> Result<AgentFinding>;
}
