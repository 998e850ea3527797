//! Bounded retries for optimistic appends.

use crate::core::{Error, IncidentId, Result};
use crate::store::backend::EventStore;
use crate::store::event::EventBody;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration for store appends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff
    pub max_backoff_ms: u64,
    /// Timeout for each append attempt
    pub append_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 20,
            max_backoff_ms: 1_000,
            append_timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`: exponential with up to 50% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff_ms
            .saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.max_backoff_ms);
        let jitter = if capped > 1 {
            rand::thread_rng().gen_range(0..=capped / 2)
        } else {
            0
        };
        Duration::from_millis(capped.saturating_add(jitter).min(self.max_backoff_ms))
    }

    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("store retry attempts must be > 0".into()));
        }
        if self.append_timeout_ms == 0 {
            return Err(Error::InvalidConfig("store append timeout must be > 0".into()));
        }
        Ok(())
    }
}

/// Append at the incident's current version, retrying version conflicts.
///
/// Each attempt re-reads the version and is bounded by the append timeout.
/// Returns the new version.
pub async fn append_with_retry(
    store: &dyn EventStore,
    incident_id: &IncidentId,
    body: EventBody,
    policy: &RetryPolicy,
) -> Result<u64> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::time::timeout(policy.append_timeout(), async {
            let version = store.current_version(incident_id).await?;
            store.append(incident_id, version, body.clone()).await
        })
        .await
        .unwrap_or(Err(Error::StoreTimeout));

        match result {
            Ok(version) => return Ok(version),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let backoff = policy.backoff(attempt);
                debug!(
                    incident_id = %incident_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retrying append after version conflict"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(incident_id = %incident_id, attempts, "Append retries exhausted");
                }
                return Err(e);
            }
        }
    }
}
