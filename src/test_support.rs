//! Scripted agents, flaky stores and recording collaborators for tests.

use crate::agent::{ActionCategory, Agent, AgentFinding, FindingPayload, IncidentContext};
use crate::consensus::Decision;
use crate::coordinator::{EmergencyAlert, EmergencyAlerter, ResolutionExecutor, ResolutionResult};
use crate::core::{Error, IncidentId, Result};
use crate::store::{
    AuditSink, BackendType, Event, EventBody, EventStore, InMemoryEventStore, VersionRange,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

enum Script {
    Respond,
    Fail,
    FailFirst(u32),
    Sleep(Duration),
}

/// Agent with a fixed behaviour.
pub struct ScriptedAgent {
    id: String,
    confidence: f32,
    action: ActionCategory,
    script: Script,
    calls: AtomicU32,
}

impl ScriptedAgent {
    fn build(id: &str, confidence: f32, action: ActionCategory, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            confidence,
            action,
            script,
            calls: AtomicU32::new(0),
        })
    }

    /// Responds immediately, recommending a restart.
    pub fn responding(id: &str, confidence: f32) -> Arc<Self> {
        Self::build(id, confidence, ActionCategory::Restart, Script::Respond)
    }

    pub fn responding_with(id: &str, confidence: f32, action: ActionCategory) -> Arc<Self> {
        Self::build(id, confidence, action, Script::Respond)
    }

    /// Always returns an error.
    pub fn failing(id: &str) -> Arc<Self> {
        Self::build(id, 0.0, ActionCategory::Restart, Script::Fail)
    }

    /// Fails the first `n` calls, then responds.
    pub fn failing_first(id: &str, confidence: f32, n: u32) -> Arc<Self> {
        Self::build(id, confidence, ActionCategory::Restart, Script::FailFirst(n))
    }

    /// Sleeps for `delay` before responding.
    pub fn slow(id: &str, confidence: f32, delay: Duration) -> Arc<Self> {
        Self::build(id, confidence, ActionCategory::Restart, Script::Sleep(delay))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn finding(&self) -> AgentFinding {
        let payload = FindingPayload::new(&format!("{} analysis", self.id), self.action)
            .with_root_cause("scripted");
        AgentFinding::new(&self.id, payload, self.confidence)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "scripted test agent"
    }

    async fn invoke(&self, _ctx: &IncidentContext, _deadline: Instant) -> Result<AgentFinding> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.script {
            Script::Respond => Ok(self.finding()),
            Script::Fail => Err(Error::AgentFailed {
                agent: self.id.clone(),
                reason: "scripted failure".into(),
            }),
            Script::FailFirst(n) if call <= n => Err(Error::AgentFailed {
                agent: self.id.clone(),
                reason: format!("scripted failure {} of {}", call, n),
            }),
            Script::FailFirst(_) => Ok(self.finding()),
            Script::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.finding())
            }
        }
    }
}

/// Sink recording delivered incident ids, failing for one incident.
pub struct RecordingSink {
    fail_for: String,
    delivered: Mutex<Vec<String>>,
    attempts: AtomicU32,
}

impl RecordingSink {
    pub fn failing_on(incident_id: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_for: incident_id.to_string(),
            delivered: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
        })
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, event: &Event) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if event.incident_id.as_str() == self.fail_for {
            return Err(Error::Internal("sink rejected event".into()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push(event.incident_id.to_string());
        Ok(())
    }
}

/// In-memory store whose appends fail on demand.
pub struct FlakyStore {
    inner: InMemoryEventStore,
    conflicts_left: AtomicU32,
    unavailable: bool,
    append_calls: AtomicU32,
}

impl FlakyStore {
    /// The first `n` appends report a version conflict.
    pub fn conflicting(n: u32) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            conflicts_left: AtomicU32::new(n),
            unavailable: false,
            append_calls: AtomicU32::new(0),
        }
    }

    /// Every append fails; reads still work.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::conflicting(0)
        }
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, expected_version: u64) -> Option<Error> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Some(Error::StoreUnavailable("injected outage".into()));
        }
        let conflict = self
            .conflicts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        conflict.then(|| Error::VersionConflict {
            expected: expected_version,
            actual: expected_version + 1,
        })
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn append(
        &self,
        incident_id: &IncidentId,
        expected_version: u64,
        body: EventBody,
    ) -> Result<u64> {
        if let Some(e) = self.injected_failure(expected_version) {
            return Err(e);
        }
        self.inner.append(incident_id, expected_version, body).await
    }

    async fn append_sealed(&self, event: Event) -> Result<u64> {
        if let Some(e) = self.injected_failure(event.version.saturating_sub(1)) {
            return Err(e);
        }
        self.inner.append_sealed(event).await
    }

    async fn events(&self, incident_id: &IncidentId, range: VersionRange) -> Result<Vec<Event>> {
        self.inner.events(incident_id, range).await
    }

    async fn current_version(&self, incident_id: &IncidentId) -> Result<u64> {
        self.inner.current_version(incident_id).await
    }

    async fn incident_ids(&self) -> Result<Vec<IncidentId>> {
        self.inner.incident_ids().await
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }
}

/// Resolver that always fails.
pub struct FailingResolver;

#[async_trait]
impl ResolutionExecutor for FailingResolver {
    async fn execute(&self, _incident_id: &IncidentId, _decision: &Decision) -> Result<ResolutionResult> {
        Err(Error::ResolutionFailed("scripted resolver failure".into()))
    }
}

/// Alerter keeping every alert it receives.
#[derive(Default)]
pub struct RecordingAlerter {
    alerts: Mutex<Vec<EmergencyAlert>>,
}

impl RecordingAlerter {
    pub fn alerts(&self) -> Vec<EmergencyAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmergencyAlerter for RecordingAlerter {
    async fn alert(&self, alert: &EmergencyAlert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
