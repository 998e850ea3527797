//! Store factory.
//!
//! Creates event stores based on configuration.

use crate::core::{Error, Result};
use crate::store::backend::{BackendType, EventStore};
use crate::store::file::FileEventStore;
use crate::store::memory::InMemoryEventStore;
use crate::store::publisher::{EventPublisher, DEFAULT_PUBLISH_CAPACITY};
use crate::store::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Event store configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend to use
    pub backend: BackendType,
    /// Journal path, required for the file backend
    pub path: Option<PathBuf>,
    /// Capacity of the committed-event broadcast channel
    pub publish_capacity: usize,
    /// Append retry and timeout policy
    #[serde(flatten)]
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Memory,
            path: None,
            publish_capacity: DEFAULT_PUBLISH_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// File-backed configuration.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendType::File,
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.publish_capacity == 0 {
            return Err(Error::InvalidConfig("publish_capacity must be > 0".into()));
        }
        if self.backend == BackendType::File && self.path.is_none() {
            return Err(Error::InvalidConfig("file store requires a path".into()));
        }
        Ok(())
    }
}

/// Create an event store publishing committed events to `publisher`.
pub async fn create_event_store(
    config: &StoreConfig,
    publisher: EventPublisher,
) -> Result<Arc<dyn EventStore>> {
    match config.backend {
        BackendType::Memory => Ok(Arc::new(InMemoryEventStore::new().with_publisher(publisher))),
        BackendType::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| Error::InvalidConfig("file store requires a path".into()))?;
            let store = FileEventStore::open_with_publisher(path, publisher).await?;
            Ok(Arc::new(store))
        }
    }
}
