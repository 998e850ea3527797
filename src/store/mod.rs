//! Event Store.
//!
//! Append-only, hash-chained incident histories with optimistic concurrency,
//! state replay and one-way publication of committed events.

pub mod backend;
pub mod event;
pub mod factory;
pub mod file;
pub mod memory;
pub mod projection;
pub mod publisher;
pub mod retry;

pub use backend::{BackendType, EventStore, VersionRange};
pub use event::{Event, EventBody, EventType};
pub use factory::{create_event_store, StoreConfig};
pub use file::FileEventStore;
pub use memory::InMemoryEventStore;
pub use projection::IncidentState;
pub use publisher::{AuditSink, EventPublisher, DEFAULT_PUBLISH_CAPACITY};
pub use retry::{append_with_retry, RetryPolicy};
