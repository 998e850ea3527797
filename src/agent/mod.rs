//! Agent Module
//!
//! Pluggable analyzers:
//! - The `Agent` contract and the context it receives
//! - Findings with confidence scores
//! - A startup registry pairing each agent with a circuit breaker

pub mod finding;
pub mod interface;
pub mod registry;

pub use finding::{ActionCategory, AgentFinding, FindingPayload};
pub use interface::{Agent, IncidentContext};
pub use registry::{AgentHealth, AgentRegistry, RegisteredAgent};
