//! Consensus Module
//!
//! Provides Byzantine-tolerant decision making:
//! - Weighted confidence renormalized over responding agents
//! - Configurable autonomy threshold and quorum rule
//! - Decisions carrying their evidence and exclusions

pub mod decision;
pub mod engine;
pub mod quorum;
pub mod weights;

pub use decision::{Decision, ExcludedAgent, INSUFFICIENT_CONFIDENCE_NOTE};
pub use engine::{build_consensus, ConsensusEngine};
pub use quorum::{ConsensusPolicy, QuorumRule};
pub use weights::ConsensusWeights;
