//! Incident model.
//!
//! Severity, lifecycle states, degradation tiers and the input accepted by
//! the coordinator.
//! The authoritative incident record is the event history in the store;
//! see [`crate::store::IncidentState`] for the replayed projection.

pub mod model;

pub use model::{DegradationTier, IncidentInput, LifecycleState, Severity};
