//! One-way event publication.
//!
//! Committed events go out on a broadcast channel. Subscribers and sinks
//! never feed back into the coordinator: slow receivers lag and sink errors
//! are only logged.

use crate::core::Result;
use crate::store::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default channel capacity.
pub const DEFAULT_PUBLISH_CAPACITY: usize = 1024;

/// External destination for committed events (notification, audit).
#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one event. Failures are logged by the forwarder.
    async fn publish(&self, event: &Event) -> Result<()>;
}

/// Broadcast publisher for committed events.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    sender: broadcast::Sender<Event>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: &Event) {
        if self.sender.send(event.clone()).is_err() {
            debug!(
                incident_id = %event.incident_id,
                version = event.version,
                "No subscribers for event"
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawn a task delivering every published event to `sink`.
    ///
    /// The task ends once all publisher handles are dropped.
    pub fn spawn_forwarder(&self, sink: Arc<dyn AuditSink>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if let Err(e) = sink.publish(&event).await {
                            warn!(
                                sink = sink.name(),
                                incident_id = %event.incident_id,
                                version = event.version,
                                error = %e,
                                "Audit sink delivery failed"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(sink = sink.name(), skipped, "Audit sink lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(sink = sink.name(), "Audit forwarder stopped");
        })
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLISH_CAPACITY)
    }
}
