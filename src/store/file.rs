//! File-backed event store.
//!
//! Events are journaled as JSON lines, one record per event, and served from
//! memory. Opening a journal replays and verifies every record.
//!
//! Writes run on their own task, so a caller that stops waiting cannot leave
//! a record in the journal that the in-memory stream never saw. A failed
//! write truncates the journal back to its last complete record.

use crate::core::{Error, IncidentId, Result};
use crate::store::backend::{BackendType, EventStore, VersionRange};
use crate::store::event::{Event, EventBody};
use crate::store::memory::{CommitHook, InMemoryEventStore};
use crate::store::publisher::EventPublisher;
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info};

struct Journal {
    file: File,
    /// Length of the journal up to the end of the last complete record
    committed_len: u64,
}

impl Journal {
    async fn open(file: File) -> Result<Self> {
        let committed_len = file.metadata().await?.len();
        Ok(Self {
            file,
            committed_len,
        })
    }

    async fn append_line(&mut self, line: &str) -> Result<()> {
        match self.write_synced(line).await {
            Ok(()) => {
                self.committed_len += line.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.rollback().await;
                Err(e)
            }
        }
    }

    async fn write_synced(&mut self, line: &str) -> Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }

    /// Cut the journal back to the last complete record.
    async fn rollback(&mut self) {
        let truncated = match self.file.set_len(self.committed_len).await {
            Ok(()) => self.file.sync_data().await,
            Err(e) => Err(e),
        };
        if let Err(e) = truncated {
            error!(
                committed_len = self.committed_len,
                error = %e,
                "Journal rollback failed, reopen will reject the torn record"
            );
        }
    }
}

struct JournalWriter {
    journal: Mutex<Journal>,
}

#[async_trait]
impl CommitHook for JournalWriter {
    async fn before_commit(&self, event: &Event) -> Result<()> {
        let mut line = event.to_json()?;
        line.push('\n');
        self.journal.lock().await.append_line(&line).await
    }
}

/// Event store persisting to an append-only JSON-lines journal.
pub struct FileEventStore {
    path: PathBuf,
    inner: Arc<InMemoryEventStore>,
}

impl FileEventStore {
    /// Open (or create) the journal at `path`, verifying existing records.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path.as_ref(), None).await
    }

    /// Like [`FileEventStore::open`], publishing every event committed after
    /// the journal is loaded.
    pub async fn open_with_publisher(
        path: impl AsRef<Path>,
        publisher: EventPublisher,
    ) -> Result<Self> {
        Self::open_with(path.as_ref(), Some(publisher)).await
    }

    async fn open_with(path: &Path, publisher: Option<EventPublisher>) -> Result<Self> {
        let path = path.to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let loaded = InMemoryEventStore::new();
        let mut records = 0usize;
        if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            for (index, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let event = Event::from_json(line).map_err(|e| {
                    Error::SerializationError(format!("{}:{}: {}", path.display(), index + 1, e))
                })?;
                let incident_id = event.incident_id.to_string();
                let version = event.version;
                loaded.append_sealed(event).await.map_err(|e| match e {
                    Error::VersionConflict { .. } => Error::IntegrityViolation {
                        incident_id,
                        version,
                    },
                    other => other,
                })?;
                records += 1;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let writer = Arc::new(JournalWriter {
            journal: Mutex::new(Journal::open(file).await?),
        });

        let mut inner = loaded.with_commit_hook(writer);
        if let Some(publisher) = publisher {
            inner = inner.with_publisher(publisher);
        }

        info!(path = %path.display(), records, "Event journal opened");
        Ok(Self {
            path,
            inner: Arc::new(inner),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drive a write to completion on its own task.
async fn detached<F>(write: F) -> Result<u64>
where
    F: Future<Output = Result<u64>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|e| Error::Internal(format!("journal write task failed: {}", e)))?
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(
        &self,
        incident_id: &IncidentId,
        expected_version: u64,
        body: EventBody,
    ) -> Result<u64> {
        let inner = self.inner.clone();
        let incident_id = incident_id.clone();
        detached(async move { inner.append(&incident_id, expected_version, body).await }).await
    }

    async fn append_sealed(&self, event: Event) -> Result<u64> {
        let inner = self.inner.clone();
        detached(async move { inner.append_sealed(event).await }).await
    }

    async fn events(&self, incident_id: &IncidentId, range: VersionRange) -> Result<Vec<Event>> {
        self.inner.events(incident_id, range).await
    }

    async fn current_version(&self, incident_id: &IncidentId) -> Result<u64> {
        self.inner.current_version(incident_id).await
    }

    async fn incident_ids(&self) -> Result<Vec<IncidentId>> {
        self.inner.incident_ids().await
    }

    fn backend_type(&self) -> BackendType {
        BackendType::File
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{DegradationTier, LifecycleState, Severity};
    use std::time::Duration;
    use tempfile::tempdir;

    fn detected() -> EventBody {
        EventBody::IncidentDetected {
            description: "tls expiry".into(),
            severity: Severity::Critical,
            signals: serde_json::json!({"days_left": 0}),
        }
    }

    fn dispatched() -> EventBody {
        EventBody::AgentsDispatched {
            round: 1,
            tier: DegradationTier::Full,
            agents: vec!["detection".into(), "risk".into()],
        }
    }

    #[tokio::test]
    async fn test_reopen_restores_streams() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let id = IncidentId::new("inc-1");

        {
            let store = FileEventStore::open(&path).await.unwrap();
            store.append(&id, 0, detected()).await.unwrap();
            store.append(&id, 1, dispatched()).await.unwrap();
        }

        let store = FileEventStore::open(&path).await.unwrap();
        assert_eq!(store.current_version(&id).await.unwrap(), 2);
        let state = store.replay(&id).await.unwrap();
        assert_eq!(state.state, LifecycleState::Diagnosing);

        store
            .append(&id, 2, EventBody::Escalated {
                reason: "operator".into(),
                decision: None,
            })
            .await
            .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_tampered_journal_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let id = IncidentId::new("inc-1");
        {
            let store = FileEventStore::open(&path).await.unwrap();
            store.append(&id, 0, detected()).await.unwrap();
            store.append(&id, 1, dispatched()).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, contents.replace("tls expiry", "all good")).unwrap();

        assert!(matches!(
            FileEventStore::open(&path).await,
            Err(Error::IntegrityViolation { version: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_append_not_journaled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let store = FileEventStore::open(&path).await.unwrap();
        let id = IncidentId::new("inc-1");

        store.append(&id, 0, detected()).await.unwrap();
        assert!(store.append(&id, 0, detected()).await.is_err());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert_eq!(store.backend_type(), BackendType::File);
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_append_still_journaled_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let id = IncidentId::new("inc-1");
        {
            let store = FileEventStore::open(&path).await.unwrap();
            let _ = tokio::time::timeout(Duration::ZERO, store.append(&id, 0, detected())).await;

            let mut version = 0;
            for _ in 0..100 {
                version = store.current_version(&id).await.unwrap();
                if version == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(version, 1);

            assert!(matches!(
                store.append(&id, 0, detected()).await,
                Err(Error::VersionConflict { expected: 0, actual: 1 })
            ));
            store.append(&id, 1, dispatched()).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let store = FileEventStore::open(&path).await.unwrap();
        assert_eq!(store.current_version(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_cuts_torn_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .unwrap();
        let mut journal = Journal::open(file).await.unwrap();
        journal.append_line("{\"v\":1}\n").await.unwrap();

        journal.file.write_all(b"{\"v\":2,\"tor").await.unwrap();
        journal.file.flush().await.unwrap();
        journal.rollback().await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"v\":1}\n");

        journal.append_line("{\"v\":2}\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"v\":1}\n{\"v\":2}\n"
        );
        assert_eq!(journal.committed_len, 16);
    }

    #[tokio::test]
    async fn test_publisher_sees_new_events_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let id = IncidentId::new("inc-1");
        {
            let store = FileEventStore::open(&path).await.unwrap();
            store.append(&id, 0, detected()).await.unwrap();
        }

        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        let store = FileEventStore::open_with_publisher(&path, publisher)
            .await
            .unwrap();
        store.append(&id, 1, dispatched()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().version, 2);
        assert!(rx.try_recv().is_err());
    }
}
