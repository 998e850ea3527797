//! In-memory event store.
//!
//! Streams live behind a per-incident async mutex, so appends to one incident
//! are serialized while different incidents proceed in parallel.

use crate::core::{Error, Hash256, IncidentId, Result};
use crate::store::backend::{BackendType, EventStore, VersionRange};
use crate::store::event::{Event, EventBody};
use crate::store::projection::IncidentState;
use crate::store::publisher::EventPublisher;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Runs after an event is validated and before it becomes visible.
///
/// An error aborts the append and leaves the stream unchanged.
#[async_trait]
pub(crate) trait CommitHook: Send + Sync {
    async fn before_commit(&self, event: &Event) -> Result<()>;
}

#[derive(Default)]
struct Stream {
    events: Vec<Event>,
    state: Option<IncidentState>,
}

impl Stream {
    fn version(&self) -> u64 {
        self.events.len() as u64
    }
}

/// Event store keeping every stream in process memory.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<IncidentId, Arc<Mutex<Stream>>>>,
    publisher: Option<EventPublisher>,
    hook: Option<Arc<dyn CommitHook>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every committed event.
    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub(crate) fn with_commit_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn publisher(&self) -> Option<&EventPublisher> {
        self.publisher.as_ref()
    }

    fn stream(&self, incident_id: &IncidentId) -> Result<Option<Arc<Mutex<Stream>>>> {
        let streams = self.streams.read()?;
        Ok(streams.get(incident_id).cloned())
    }

    fn stream_or_create(&self, incident_id: &IncidentId) -> Result<Arc<Mutex<Stream>>> {
        if let Some(stream) = self.stream(incident_id)? {
            return Ok(stream);
        }
        let mut streams = self.streams.write()?;
        Ok(streams.entry(incident_id.clone()).or_default().clone())
    }

    /// Validate, persist and expose `event` as the new tail of `stream`.
    async fn commit(&self, stream: &mut Stream, event: Event) -> Result<u64> {
        let next_state = match &stream.state {
            Some(state) => {
                let mut next = state.clone();
                next.apply(&event)?;
                next
            }
            None => IncidentState::genesis(&event)?,
        };

        if let Some(hook) = &self.hook {
            hook.before_commit(&event).await?;
        }

        let version = event.version;
        debug!(
            incident_id = %event.incident_id,
            version,
            event_type = %event.event_type,
            "Event committed"
        );
        if let Some(publisher) = &self.publisher {
            publisher.publish(&event);
        }
        stream.events.push(event);
        stream.state = Some(next_state);
        Ok(version)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        incident_id: &IncidentId,
        expected_version: u64,
        body: EventBody,
    ) -> Result<u64> {
        let stream = self.stream_or_create(incident_id)?;
        let mut stream = stream.lock().await;

        let actual = stream.version();
        if expected_version != actual {
            return Err(Error::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let previous_hash = match stream.events.last() {
            Some(tail) if !tail.hash_is_valid() => {
                return Err(Error::ChainBroken(format!(
                    "tail of incident {} at version {} fails its hash",
                    incident_id, tail.version
                )));
            }
            Some(tail) => tail.hash.clone(),
            None => Hash256::zero(),
        };

        let event = Event::seal(incident_id.clone(), actual + 1, body, previous_hash)?;
        self.commit(&mut stream, event).await
    }

    async fn append_sealed(&self, event: Event) -> Result<u64> {
        let stream = self.stream_or_create(&event.incident_id)?;
        let mut stream = stream.lock().await;

        let actual = stream.version();
        if event.version != actual + 1 {
            return Err(Error::VersionConflict {
                expected: event.version.saturating_sub(1),
                actual,
            });
        }
        event.verify(stream.events.last())?;
        self.commit(&mut stream, event).await
    }

    async fn events(&self, incident_id: &IncidentId, range: VersionRange) -> Result<Vec<Event>> {
        let Some(stream) = self.stream(incident_id)? else {
            return Ok(Vec::new());
        };
        let stream = stream.lock().await;
        Ok(stream
            .events
            .iter()
            .filter(|e| range.contains(e.version))
            .cloned()
            .collect())
    }

    async fn current_version(&self, incident_id: &IncidentId) -> Result<u64> {
        match self.stream(incident_id)? {
            Some(stream) => Ok(stream.lock().await.version()),
            None => Ok(0),
        }
    }

    async fn incident_ids(&self) -> Result<Vec<IncidentId>> {
        let streams: Vec<(IncidentId, Arc<Mutex<Stream>>)> = {
            let map = self.streams.read()?;
            map.iter().map(|(id, s)| (id.clone(), s.clone())).collect()
        };
        let mut ids = Vec::with_capacity(streams.len());
        for (id, stream) in streams {
            if stream.lock().await.version() > 0 {
                ids.push(id);
            }
        }
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::DegradationTier;
    use crate::incident::{LifecycleState, Severity};
    use tokio_test::assert_err;

    fn detected() -> EventBody {
        EventBody::IncidentDetected {
            description: "queue backlog".into(),
            severity: Severity::High,
            signals: serde_json::Value::Null,
        }
    }

    fn dispatched(round: u32) -> EventBody {
        EventBody::AgentsDispatched {
            round,
            tier: DegradationTier::Full,
            agents: vec!["detection".into()],
        }
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let store = InMemoryEventStore::new();
        let id = IncidentId::new("inc-1");

        assert_eq!(store.append(&id, 0, detected()).await.unwrap(), 1);
        assert_eq!(store.append(&id, 1, dispatched(1)).await.unwrap(), 2);

        let state = store.replay(&id).await.unwrap();
        assert_eq!(state.state, LifecycleState::Diagnosing);
        assert_eq!(state.version, 2);
        assert_eq!(store.current_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stale_version_rejected_and_unchanged() {
        let store = InMemoryEventStore::new();
        let id = IncidentId::new("inc-1");
        store.append(&id, 0, detected()).await.unwrap();

        let err = store.append(&id, 0, dispatched(1)).await.unwrap_err();
        assert!(matches!(err, Error::VersionConflict { expected: 0, actual: 1 }));
        assert_eq!(store.current_version(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_one_winner() {
        let store = Arc::new(InMemoryEventStore::new());
        let id = IncidentId::new("inc-race");
        store.append(&id, 0, detected()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { store.append(&id, 1, dispatched(1)).await }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.current_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_transition_not_committed() {
        let store = InMemoryEventStore::new();
        let id = IncidentId::new("inc-1");
        store.append(&id, 0, detected()).await.unwrap();

        let body = EventBody::ResolutionStarted {
            action: crate::agent::ActionCategory::Restart,
        };
        assert_err!(store.append(&id, 1, body).await);
        assert_eq!(store.current_version(&id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_sealed_must_link() {
        let source = InMemoryEventStore::new();
        let id = IncidentId::new("inc-1");
        source.append(&id, 0, detected()).await.unwrap();
        source.append(&id, 1, dispatched(1)).await.unwrap();
        let events = source.events(&id, VersionRange::all()).await.unwrap();

        let target = InMemoryEventStore::new();
        assert!(target.append_sealed(events[1].clone()).await.is_err());
        target.append_sealed(events[0].clone()).await.unwrap();
        target.append_sealed(events[1].clone()).await.unwrap();

        let forged = Event::seal(id.clone(), 3, dispatched(2), Hash256::new([1u8; 32])).unwrap();
        assert!(matches!(
            target.append_sealed(forged).await,
            Err(Error::IntegrityViolation { version: 3, .. })
        ));
        assert_eq!(target.current_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_events_range_and_ids() {
        let store = InMemoryEventStore::new();
        let a = IncidentId::new("inc-a");
        let b = IncidentId::new("inc-b");
        store.append(&a, 0, detected()).await.unwrap();
        store.append(&a, 1, dispatched(1)).await.unwrap();
        store.append(&b, 0, detected()).await.unwrap();
        let _ = store.append(&IncidentId::new("inc-c"), 5, detected()).await;

        let tail = store.events(&a, VersionRange::from(2)).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].version, 2);
        assert_eq!(store.incident_ids().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_replay_unknown_incident() {
        let store = InMemoryEventStore::new();
        assert!(matches!(
            store.replay(&IncidentId::new("missing")).await,
            Err(Error::IncidentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publishes_after_commit() {
        let publisher = EventPublisher::new(16);
        let mut rx = publisher.subscribe();
        let store = InMemoryEventStore::new().with_publisher(publisher);
        let id = IncidentId::new("inc-1");

        store.append(&id, 0, detected()).await.unwrap();
        assert!(store.append(&id, 0, detected()).await.is_err());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.version, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tampered_tail_blocks_append() {
        let store = InMemoryEventStore::new();
        let id = IncidentId::new("inc-1");
        store.append(&id, 0, detected()).await.unwrap();
        store.append(&id, 1, dispatched(1)).await.unwrap();

        let stream = store.stream(&id).unwrap().unwrap();
        stream.lock().await.events[1].payload = serde_json::json!({"round": 9});

        let err = store
            .append(&id, 2, EventBody::Escalated {
                reason: "operator".into(),
                decision: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChainBroken(_)));
        assert_eq!(store.current_version(&id).await.unwrap(), 2);
    }
}
