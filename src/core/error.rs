//! Error types for BICO.

use thiserror::Error;

/// Result type alias for BICO operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in BICO operations.
#[derive(Error, Debug)]
pub enum Error {
    // Agent-local errors
    #[error("Agent {agent} failed: {reason}")]
    AgentFailed { agent: String, reason: String },

    #[error("Agent {0} timed out")]
    AgentTimeout(String),

    #[error("Circuit open for agent {0}")]
    CircuitOpen(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent not registered: {0}")]
    UnknownAgent(String),

    // Event store errors
    #[error("Version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Integrity violation for incident {incident_id} at version {version}")]
    IntegrityViolation { incident_id: String, version: u64 },

    #[error("Hash chain broken: {0}")]
    ChainBroken(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Incident not found: {0}")]
    IncidentNotFound(String),

    #[error("Event store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Event store operation timed out")]
    StoreTimeout,

    // Coordination errors
    #[error("Agent {0} cut off by the round deadline")]
    RoundDeadlineExceeded(String),

    #[error("Resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Coordination failed for incident {incident_id}: {reason}")]
    CoordinationFailed { incident_id: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the operation may succeed if retried after re-reading state.
    ///
    /// Only optimistic-concurrency conflicts qualify; agent failures are
    /// tolerated by exclusion and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }

    /// Whether the error means the event store cannot be used right now.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::StoreTimeout
                | Error::VersionConflict { .. }
                | Error::ChainBroken(_)
                | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Internal(format!("lock poisoned: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_version_conflict_is_retryable() {
        assert!(Error::VersionConflict { expected: 1, actual: 2 }.is_retryable());
        assert!(!Error::StoreTimeout.is_retryable());
        assert!(!Error::AgentTimeout("a".into()).is_retryable());
    }

    #[test]
    fn test_store_failure_classification() {
        assert!(Error::StoreUnavailable("down".into()).is_store_failure());
        assert!(!Error::CircuitOpen("a".into()).is_store_failure());
        assert!(!Error::IntegrityViolation {
            incident_id: "i".into(),
            version: 1
        }
        .is_store_failure());
    }

    #[test]
    fn test_error_display() {
        let err = Error::VersionConflict { expected: 3, actual: 4 };
        assert_eq!(err.to_string(), "Version conflict: expected 3, actual 4");
    }
}
