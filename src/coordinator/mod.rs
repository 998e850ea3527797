//! Coordinator Module
//!
//! Incident handling end to end:
//! - Concurrent agent rounds under per-agent and round deadlines
//! - Consensus, then resolution or escalation
//! - A degradation ladder for rounds that yield nothing usable

pub mod collaborators;
pub mod degradation;
pub mod orchestrator;
pub mod round;

pub use collaborators::{
    DryRunResolver, EmergencyAlert, EmergencyAlerter, LogAlerter, ResolutionExecutor,
    ResolutionResult,
};
pub use degradation::{DegradationConfig, DegradationManager};
pub use orchestrator::{Coordinator, CoordinatorStats};
pub use round::{run_round, RoundConfig, RoundOutcome};
