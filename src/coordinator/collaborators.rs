//! Outbound collaborators: resolution execution and emergency alerting.

use crate::agent::ActionCategory;
use crate::consensus::Decision;
use crate::core::{now, IncidentId, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{error, info};

/// Outcome reported by a resolution executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Action that was carried out
    pub action: ActionCategory,
    /// Whether the executor reports success
    pub success: bool,
    /// Operator-facing summary
    pub summary: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ResolutionResult {
    pub fn succeeded(action: ActionCategory, summary: &str) -> Self {
        Self {
            action,
            success: true,
            summary: summary.to_string(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Carries out the remediation chosen by an autonomous decision.
#[async_trait]
pub trait ResolutionExecutor: Send + Sync {
    async fn execute(&self, incident_id: &IncidentId, decision: &Decision) -> Result<ResolutionResult>;
}

/// Records the decision without acting on anything.
#[derive(Debug, Default)]
pub struct DryRunResolver {
    executed: Mutex<Vec<(IncidentId, ActionCategory)>>,
}

impl DryRunResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions "executed" so far.
    pub fn executed(&self) -> Vec<(IncidentId, ActionCategory)> {
        self.executed
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResolutionExecutor for DryRunResolver {
    async fn execute(&self, incident_id: &IncidentId, decision: &Decision) -> Result<ResolutionResult> {
        info!(
            incident_id = %incident_id,
            action = %decision.action,
            confidence = decision.confidence,
            "Dry-run resolution"
        );
        self.executed
            .lock()?
            .push((incident_id.clone(), decision.action));
        Ok(ResolutionResult::succeeded(
            decision.action,
            &format!("dry run: {}", decision.action),
        ))
    }
}

/// Alert raised when every degradation tier has been exhausted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub incident_id: IncidentId,
    pub description: String,
    pub reason: String,
    /// Last decision reached before the failure, if any
    pub decision: Option<Decision>,
    pub raised_at: Timestamp,
}

impl EmergencyAlert {
    pub fn new(incident_id: IncidentId, description: &str, reason: &str) -> Self {
        Self {
            incident_id,
            description: description.to_string(),
            reason: reason.to_string(),
            decision: None,
            raised_at: now(),
        }
    }

    pub fn with_decision(mut self, decision: Option<Decision>) -> Self {
        self.decision = decision;
        self
    }
}

/// Out-of-band channel that does not depend on the event store.
#[async_trait]
pub trait EmergencyAlerter: Send + Sync {
    async fn alert(&self, alert: &EmergencyAlert) -> Result<()>;
}

/// Alerter that writes the alert to the error log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlerter;

#[async_trait]
impl EmergencyAlerter for LogAlerter {
    async fn alert(&self, alert: &EmergencyAlert) -> Result<()> {
        error!(
            incident_id = %alert.incident_id,
            reason = %alert.reason,
            description = %alert.description,
            "EMERGENCY: incident could not be coordinated"
        );
        Ok(())
    }
}
