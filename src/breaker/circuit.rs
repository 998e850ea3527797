//! Per-agent circuit breaker.
//!
//! Closed → Open after `failure_threshold` consecutive failures inside the
//! failure window; Open → HalfOpen lazily once the cooldown has elapsed;
//! HalfOpen admits a single trial call which closes or re-opens the circuit.

use crate::breaker::clock::{Clock, SystemClock};
use crate::core::{now, Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Circuit state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls rejected immediately
    Open,
    /// A single trial call allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Failures further apart than this restart the count
    pub failure_window_seconds: u64,
    /// Time the circuit stays open before a trial call
    pub cooldown_seconds: u64,
    /// Hard timeout applied to every call
    pub call_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_seconds: 60,
            cooldown_seconds: 30,
            call_timeout_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_seconds)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Notification emitted whenever a breaker changes state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakerTransition {
    /// Agent the breaker guards
    pub agent: String,
    pub from: CircuitState,
    pub to: CircuitState,
    /// Failure count at the time of the transition
    pub failure_count: u32,
    pub at: Timestamp,
}

/// Point-in-time view of a breaker, for health reporting.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub agent: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<Timestamp>,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<Timestamp>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_at: None,
            opened_at: None,
            trial_in_flight: false,
            total_calls: 0,
            total_failures: 0,
            total_rejections: 0,
        }
    }
}

/// Circuit breaker guarding a single agent.
///
/// All counters live behind one mutex; the lock is never held across an
/// `.await`, so concurrent incidents can share a breaker safely.
pub struct CircuitBreaker {
    agent: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
    transitions: Option<broadcast::Sender<BreakerTransition>>,
}

impl CircuitBreaker {
    /// Create a breaker using the system clock.
    pub fn new(agent: &str, config: BreakerConfig) -> Self {
        Self::with_clock(agent, config, Arc::new(SystemClock))
    }

    /// Create a breaker with an injected clock.
    pub fn with_clock(agent: &str, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent: agent.to_string(),
            config,
            clock,
            inner: Mutex::new(BreakerInner::new()),
            transitions: None,
        }
    }

    /// Publish state transitions on the given channel.
    pub fn with_notifier(mut self, sender: broadcast::Sender<BreakerTransition>) -> Self {
        self.transitions = Some(sender);
        self
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current stored state. An open circuit whose cooldown has elapsed is
    /// still reported as open until the next call attempt.
    pub fn state(&self) -> CircuitState {
        self.lock().map(|inner| inner.state).unwrap_or(CircuitState::Open)
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().map(|inner| inner.failure_count).unwrap_or(0)
    }

    /// Ask for permission to make a call.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>> {
        let now = self.clock.now();
        let mut inner = self.lock()?;

        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|opened| now.duration_since(opened) >= self.config.cooldown())
                    .unwrap_or(true);
                if !cooled {
                    inner.total_rejections += 1;
                    return Err(Error::CircuitOpen(self.agent.clone()));
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    inner.total_rejections += 1;
                    return Err(Error::CircuitOpen(self.agent.clone()));
                }
                inner.trial_in_flight = true;
                true
            }
        };

        inner.total_calls += 1;
        Ok(CallPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Run `call` through the breaker with the configured hard timeout.
    ///
    /// Errors and timeouts both count as failures. A rejected call returns
    /// [`Error::CircuitOpen`] without polling `call`.
    pub async fn call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let permit = self.try_acquire()?;
        match tokio::time::timeout(self.config.call_timeout(), call).await {
            Ok(Ok(value)) => {
                permit.succeed();
                Ok(value)
            }
            Ok(Err(err)) => {
                permit.fail();
                Err(err)
            }
            Err(_) => {
                permit.fail();
                Err(Error::AgentTimeout(self.agent.clone()))
            }
        }
    }

    /// Count a failure for a call cut off outside [`CircuitBreaker::call`],
    /// such as an agent aborted at its round deadline.
    pub fn record_failure(&self) {
        self.on_failure(false);
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        if let Ok(mut inner) = self.lock() {
            if inner.state != CircuitState::Closed {
                self.transition(&mut inner, CircuitState::Closed);
            }
            inner.failure_count = 0;
            inner.opened_at = None;
            inner.trial_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        match self.lock() {
            Ok(inner) => BreakerSnapshot {
                agent: self.agent.clone(),
                state: inner.state,
                failure_count: inner.failure_count,
                last_failure_at: inner.last_failure_at,
                total_calls: inner.total_calls,
                total_failures: inner.total_failures,
                total_rejections: inner.total_rejections,
            },
            Err(_) => BreakerSnapshot {
                agent: self.agent.clone(),
                state: CircuitState::Open,
                failure_count: 0,
                last_failure_at: None,
                total_calls: 0,
                total_failures: 0,
                total_rejections: 0,
            },
        }
    }

    fn on_success(&self, trial: bool) {
        let Ok(mut inner) = self.lock() else { return };
        if trial {
            inner.trial_in_flight = false;
        }
        inner.failure_count = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.opened_at = None;
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    fn on_failure(&self, trial: bool) {
        let now = self.clock.now();
        let Ok(mut inner) = self.lock() else { return };
        if trial {
            inner.trial_in_flight = false;
        }

        let stale = inner
            .last_failure
            .map(|last| now.duration_since(last) > self.config.failure_window())
            .unwrap_or(false);
        if stale {
            inner.failure_count = 0;
        }

        inner.failure_count += 1;
        inner.total_failures += 1;
        inner.last_failure = Some(now);
        inner.last_failure_at = Some(crate::core::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.opened_at = Some(now);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.opened_at = Some(now);
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn on_abandoned(&self, trial: bool) {
        if !trial {
            return;
        }
        if let Ok(mut inner) = self.lock() {
            inner.trial_in_flight = false;
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;

        match to {
            CircuitState::Open => warn!(
                agent = %self.agent,
                failures = inner.failure_count,
                "circuit opened"
            ),
            CircuitState::HalfOpen => debug!(agent = %self.agent, "circuit half-open, admitting trial call"),
            CircuitState::Closed => info!(agent = %self.agent, "circuit closed"),
        }

        if let Some(sender) = &self.transitions {
            // No receivers is fine; notifications are best effort.
            let _ = sender.send(BreakerTransition {
                agent: self.agent.clone(),
                from,
                to,
                failure_count: inner.failure_count,
                at: now(),
            });
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BreakerInner>> {
        Ok(self.inner.lock()?)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("agent", &self.agent)
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .finish()
    }
}

/// Permission to make one call. Must be settled with [`CallPermit::succeed`]
/// or [`CallPermit::fail`]; dropping it unsettled (for example when the call
/// is cancelled) releases a half-open trial slot without counting a failure.
#[must_use]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.trial);
        }
    }
}
