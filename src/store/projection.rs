//! Incident state projection.
//!
//! Rebuilt by folding an incident's events in version order. The store also
//! folds each candidate event before committing it, so an append that would
//! break the lifecycle is rejected up front.

use crate::consensus::Decision;
use crate::coordinator::ResolutionResult;
use crate::core::{Error, Hash256, IncidentId, Result, Timestamp};
use crate::incident::{DegradationTier, LifecycleState, Severity};
use crate::store::event::{Event, EventBody};
use serde::{Deserialize, Serialize};

/// Replayed state of one incident.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentState {
    pub incident_id: IncidentId,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub signals: serde_json::Value,
    /// Current lifecycle state
    pub state: LifecycleState,
    /// Number of events folded so far
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Consensus rounds started
    pub rounds: u32,
    /// Round whose findings have been recorded, if any
    pub findings_recorded_round: Option<u32>,
    /// Most severe degradation tier entered
    pub tier: DegradationTier,
    /// Latest decision, from consensus or escalation
    pub last_decision: Option<Decision>,
    pub resolution: Option<ResolutionResult>,
    pub escalation_reason: Option<String>,
    /// Hash of the latest event
    pub head_hash: Hash256,
}

impl IncidentState {
    /// Start a projection from the first event of an incident.
    pub fn genesis(event: &Event) -> Result<Self> {
        event.verify(None)?;
        match event.body()? {
            EventBody::IncidentDetected {
                description,
                severity,
                signals,
            } => Ok(Self {
                incident_id: event.incident_id.clone(),
                description,
                severity,
                signals,
                state: LifecycleState::Detected,
                version: event.version,
                created_at: event.timestamp,
                updated_at: event.timestamp,
                rounds: 0,
                findings_recorded_round: None,
                tier: DegradationTier::Full,
                last_decision: None,
                resolution: None,
                escalation_reason: None,
                head_hash: event.hash.clone(),
            }),
            other => Err(Error::InvalidTransition(format!(
                "incident {} must start with incident_detected, got {}",
                event.incident_id,
                other.event_type()
            ))),
        }
    }

    /// Fold a full history, verifying hashes and links.
    pub fn replay(events: &[Event]) -> Result<Self> {
        let (first, rest) = events
            .split_first()
            .ok_or_else(|| Error::IncidentNotFound("empty event history".into()))?;
        let mut state = Self::genesis(first)?;
        let mut previous = first;
        for event in rest {
            event.verify(Some(previous))?;
            state.apply(event)?;
            previous = event;
        }
        Ok(state)
    }

    /// Apply the next event. The caller is responsible for hash verification.
    pub fn apply(&mut self, event: &Event) -> Result<()> {
        if event.version != self.version + 1 {
            return Err(Error::IntegrityViolation {
                incident_id: event.incident_id.to_string(),
                version: event.version,
            });
        }

        match event.body()? {
            EventBody::IncidentDetected { .. } => {
                return Err(self.invalid("incident_detected after start"));
            }
            EventBody::AgentsDispatched { round, tier, .. } => {
                self.transition(LifecycleState::Diagnosing)?;
                if round != self.rounds + 1 {
                    return Err(self.invalid(&format!(
                        "round {} dispatched, expected {}",
                        round,
                        self.rounds + 1
                    )));
                }
                self.rounds = round;
                self.findings_recorded_round = None;
                self.raise_tier(tier);
            }
            EventBody::FindingsRecorded { round, .. } => {
                if self.state != LifecycleState::Diagnosing || round != self.rounds {
                    return Err(self.invalid(&format!("findings for round {} out of order", round)));
                }
                self.findings_recorded_round = Some(round);
            }
            EventBody::ConsensusEvaluated { round, decision } => {
                if self.findings_recorded_round != Some(round) {
                    return Err(self.invalid(&format!(
                        "decision for round {} before its findings were recorded",
                        round
                    )));
                }
                self.transition(LifecycleState::ConsensusPending)?;
                self.last_decision = Some(decision);
            }
            EventBody::DegradationTierEntered { tier, .. } => {
                self.raise_tier(tier);
            }
            EventBody::ResolutionStarted { .. } => {
                self.transition(LifecycleState::Resolving)?;
            }
            EventBody::ResolutionCompleted { result } => {
                self.transition(LifecycleState::Resolved)?;
                self.resolution = Some(result);
            }
            EventBody::Escalated { reason, decision } => {
                self.transition(LifecycleState::Escalated)?;
                self.escalation_reason = Some(reason);
                if decision.is_some() {
                    self.last_decision = decision;
                }
            }
        }

        self.version = event.version;
        self.updated_at = event.timestamp;
        self.head_hash = event.hash.clone();
        Ok(())
    }

    fn transition(&mut self, next: LifecycleState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid(&format!("{} -> {}", self.state, next)));
        }
        self.state = next;
        Ok(())
    }

    fn raise_tier(&mut self, tier: DegradationTier) {
        if tier.severity() > self.tier.severity() {
            self.tier = tier;
        }
    }

    fn invalid(&self, what: &str) -> Error {
        Error::InvalidTransition(format!("incident {}: {}", self.incident_id, what))
    }
}
