//! # BICO - Byzantine Incident Consensus Orchestrator
//!
//! Fault-tolerant multi-agent incident response:
//! - **Agents**: pluggable analyzers, each behind its own circuit breaker
//! - **Consensus**: weighted confidence over the agents that actually responded
//! - **Coordinator**: concurrent rounds, resolution or escalation, and a
//!   degradation ladder when agents go dark
//! - **Store**: hash-chained, append-only incident histories
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bico::agent::AgentRegistry;
//! use bico::config::OrchestratorConfig;
//! use bico::coordinator::Coordinator;
//! use bico::incident::{IncidentInput, Severity};
//!
//! #[tokio::main]
//! async fn main() -> bico::Result<()> {
//!     let mut config = OrchestratorConfig::from_json_file("bico.json").await?;
//!     config.apply_env_overrides()?;
//!     bico::monitoring::init_tracing(&config.logging)?;
//!
//!     let registry = AgentRegistry::new(config.breaker.clone());
//!     // registry.register(Arc::new(MyAgent::new()))?;
//!
//!     let coordinator = Coordinator::open(config, registry).await?;
//!     let decision = coordinator
//!         .handle_incident(IncidentInput::new("checkout 5xx spike", Severity::Critical))
//!         .await?;
//!     println!("{}", decision.summary());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod breaker;
pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod core;
pub mod incident;
pub mod monitoring;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use core::error::{Error, Result};
