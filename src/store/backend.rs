//! EventStore trait definition.
//!
//! Every backend keeps one append-only, hash-linked stream per incident and
//! serializes appends within an incident.

use crate::core::{Error, IncidentId, Result};
use crate::store::event::{Event, EventBody};
use crate::store::projection::IncidentState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Backend type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Process-local streams
    Memory,
    /// JSON-lines journal on disk
    File,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Memory => write!(f, "memory"),
            BackendType::File => write!(f, "file"),
        }
    }
}

/// Inclusive range of event versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl VersionRange {
    pub fn all() -> Self {
        Self { from: 1, to: None }
    }

    pub fn from(version: u64) -> Self {
        Self {
            from: version,
            to: None,
        }
    }

    pub fn between(from: u64, to: u64) -> Self {
        Self { from, to: Some(to) }
    }

    pub fn contains(&self, version: u64) -> bool {
        version >= self.from && self.to.map_or(true, |to| version <= to)
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::all()
    }
}

/// Append-only event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Seal `body` as the next event of the incident.
    ///
    /// Fails with `VersionConflict` when `expected_version` is not the
    /// current version; the stream is left unchanged.
    async fn append(
        &self,
        incident_id: &IncidentId,
        expected_version: u64,
        body: EventBody,
    ) -> Result<u64>;

    /// Append an already sealed event. It must link to the current tail.
    async fn append_sealed(&self, event: Event) -> Result<u64>;

    /// Events of an incident within `range`, in version order.
    async fn events(&self, incident_id: &IncidentId, range: VersionRange) -> Result<Vec<Event>>;

    /// Current version, 0 for an unknown incident.
    async fn current_version(&self, incident_id: &IncidentId) -> Result<u64>;

    async fn incident_ids(&self) -> Result<Vec<IncidentId>>;

    /// Rebuild incident state from its full, verified history.
    async fn replay(&self, incident_id: &IncidentId) -> Result<IncidentState> {
        let events = self.events(incident_id, VersionRange::all()).await?;
        if events.is_empty() {
            return Err(Error::IncidentNotFound(incident_id.to_string()));
        }
        IncidentState::replay(&events)
    }

    fn backend_type(&self) -> BackendType;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
