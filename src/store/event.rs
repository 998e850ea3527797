//! Incident events.
//!
//! Each event is content-addressed (SHA3-256) and links to the previous event
//! of the same incident, giving a tamper-evident chain per incident.

use crate::agent::{ActionCategory, AgentFinding};
use crate::consensus::Decision;
use crate::coordinator::ResolutionResult;
use crate::core::{now, sha3_256_multi, Error, Hash256, IncidentId, Result, Timestamp};
use crate::incident::{DegradationTier, Severity};
use serde::{Deserialize, Serialize};

/// Type tag of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IncidentDetected,
    AgentsDispatched,
    FindingsRecorded,
    ConsensusEvaluated,
    DegradationTierEntered,
    ResolutionStarted,
    ResolutionCompleted,
    Escalated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::IncidentDetected => "incident_detected",
            EventType::AgentsDispatched => "agents_dispatched",
            EventType::FindingsRecorded => "findings_recorded",
            EventType::ConsensusEvaluated => "consensus_evaluated",
            EventType::DegradationTierEntered => "degradation_tier_entered",
            EventType::ResolutionStarted => "resolution_started",
            EventType::ResolutionCompleted => "resolution_completed",
            EventType::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed content of an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum EventBody {
    IncidentDetected {
        description: String,
        severity: Severity,
        #[serde(default)]
        signals: serde_json::Value,
    },
    AgentsDispatched {
        round: u32,
        tier: DegradationTier,
        agents: Vec<String>,
    },
    FindingsRecorded {
        round: u32,
        findings: Vec<AgentFinding>,
    },
    ConsensusEvaluated {
        round: u32,
        decision: Decision,
    },
    DegradationTierEntered {
        tier: DegradationTier,
        reason: String,
    },
    ResolutionStarted {
        action: ActionCategory,
    },
    ResolutionCompleted {
        result: ResolutionResult,
    },
    Escalated {
        reason: String,
        decision: Option<Decision>,
    },
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            EventBody::IncidentDetected { .. } => EventType::IncidentDetected,
            EventBody::AgentsDispatched { .. } => EventType::AgentsDispatched,
            EventBody::FindingsRecorded { .. } => EventType::FindingsRecorded,
            EventBody::ConsensusEvaluated { .. } => EventType::ConsensusEvaluated,
            EventBody::DegradationTierEntered { .. } => EventType::DegradationTierEntered,
            EventBody::ResolutionStarted { .. } => EventType::ResolutionStarted,
            EventBody::ResolutionCompleted { .. } => EventType::ResolutionCompleted,
            EventBody::Escalated { .. } => EventType::Escalated,
        }
    }

    /// Split into the persisted (type, payload) pair.
    pub fn into_parts(self) -> Result<(EventType, serde_json::Value)> {
        let event_type = self.event_type();
        let mut tagged = serde_json::to_value(self)?;
        let payload = tagged
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null);
        Ok((event_type, payload))
    }

    /// Rebuild from the persisted (type, payload) pair.
    pub fn from_parts(event_type: EventType, payload: &serde_json::Value) -> Result<Self> {
        let tagged = serde_json::json!({
            "event_type": event_type,
            "payload": payload,
        });
        Ok(serde_json::from_value(tagged)?)
    }
}

/// An immutable, hash-linked event in an incident's history.
///
/// Field layout matches the persisted record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Incident the event belongs to
    pub incident_id: IncidentId,
    /// Position in the incident's history, starting at 1
    pub version: u64,
    /// Event type tag
    pub event_type: EventType,
    /// Event payload
    pub payload: serde_json::Value,
    /// Creation timestamp
    pub timestamp: Timestamp,
    /// Content hash of this event
    pub hash: Hash256,
    /// Hash of the previous event, zero for the first
    pub previous_hash: Hash256,
}

impl Event {
    /// Build and hash an event.
    pub fn seal(
        incident_id: IncidentId,
        version: u64,
        body: EventBody,
        previous_hash: Hash256,
    ) -> Result<Self> {
        let (event_type, payload) = body.into_parts()?;
        let mut event = Self {
            incident_id,
            version,
            event_type,
            payload,
            timestamp: now(),
            hash: Hash256::zero(),
            previous_hash,
        };
        event.hash = event.compute_hash();
        Ok(event)
    }

    /// Content hash over every field except the hash itself.
    pub fn compute_hash(&self) -> Hash256 {
        let version_bytes = self.version.to_le_bytes();
        let timestamp_str = self.timestamp.to_rfc3339();
        let payload_json = self.payload.to_string();

        sha3_256_multi(&[
            self.incident_id.as_str().as_bytes(),
            &version_bytes,
            self.event_type.as_str().as_bytes(),
            payload_json.as_bytes(),
            timestamp_str.as_bytes(),
            self.previous_hash.as_bytes(),
        ])
    }

    /// Whether the stored hash matches the content.
    pub fn hash_is_valid(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Check that this event correctly follows `previous` (or starts a chain).
    pub fn verify(&self, previous: Option<&Event>) -> Result<()> {
        if !self.hash_is_valid() {
            return Err(self.integrity_violation());
        }

        match previous {
            Some(prev) => {
                if self.incident_id != prev.incident_id
                    || self.previous_hash != prev.hash
                    || self.version != prev.version + 1
                {
                    return Err(self.integrity_violation());
                }
            }
            None => {
                if self.version != 1 || !self.previous_hash.is_zero() {
                    return Err(self.integrity_violation());
                }
            }
        }
        Ok(())
    }

    /// Decode the typed body.
    pub fn body(&self) -> Result<EventBody> {
        EventBody::from_parts(self.event_type, &self.payload)
    }

    /// Serialize to a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn integrity_violation(&self) -> Error {
        Error::IntegrityViolation {
            incident_id: self.incident_id.to_string(),
            version: self.version,
        }
    }
}
