//! Incident coordinator.
//!
//! Drives one incident through detection, a concurrent agent round,
//! consensus and resolution or escalation, recording every step in the event
//! store. When a round yields nothing usable the coordinator walks the
//! degradation ladder instead of failing.

use crate::agent::{AgentHealth, AgentRegistry, IncidentContext};
use crate::breaker::BreakerTransition;
use crate::config::OrchestratorConfig;
use crate::consensus::{ConsensusEngine, ConsensusWeights, Decision, INSUFFICIENT_CONFIDENCE_NOTE};
use crate::coordinator::collaborators::{
    DryRunResolver, EmergencyAlert, EmergencyAlerter, LogAlerter, ResolutionExecutor,
};
use crate::coordinator::degradation::DegradationManager;
use crate::coordinator::round::run_round;
use crate::core::{Error, IncidentId, Result};
use crate::incident::{DegradationTier, IncidentInput};
use crate::store::{
    append_with_retry, create_event_store, AuditSink, Event, EventBody, EventPublisher,
    EventStore, InMemoryEventStore, IncidentState, VersionRange,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EMERGENCY_REASON: &str = "all degradation tiers exhausted";

/// Counters since the coordinator was created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Incidents handled
    pub incidents: u64,
    /// Agent rounds dispatched
    pub rounds: u64,
    /// Decisions that met threshold and quorum
    pub autonomous: u64,
    /// Incidents resolved by the resolution collaborator
    pub resolved: u64,
    /// Incidents escalated to a human
    pub escalated: u64,
    /// Degradation tiers entered below full
    pub degraded: u64,
    /// Incidents that ended in an emergency alert
    pub emergencies: u64,
}

#[derive(Default)]
struct Counters {
    incidents: AtomicU64,
    rounds: AtomicU64,
    autonomous: AtomicU64,
    resolved: AtomicU64,
    escalated: AtomicU64,
    degraded: AtomicU64,
    emergencies: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CoordinatorStats {
        CoordinatorStats {
            incidents: self.incidents.load(Ordering::Relaxed),
            rounds: self.rounds.load(Ordering::Relaxed),
            autonomous: self.autonomous.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            escalated: self.escalated.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            emergencies: self.emergencies.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one automated tier.
enum TierOutcome {
    /// The incident reached resolution or escalation
    Completed(Decision),
    /// The round produced too little to act on
    Unusable(Decision),
}

/// Incident coordinator.
pub struct Coordinator {
    config: Arc<OrchestratorConfig>,
    registry: Arc<AgentRegistry>,
    weights: ConsensusWeights,
    engine: ConsensusEngine,
    degradation: DegradationManager,
    store: Arc<dyn EventStore>,
    publisher: EventPublisher,
    resolver: Arc<dyn ResolutionExecutor>,
    alerter: Arc<dyn EmergencyAlerter>,
    counters: Counters,
}

impl Coordinator {
    /// Create a coordinator with an in-memory store, a dry-run resolver and a
    /// logging alerter.
    pub fn new(config: OrchestratorConfig, registry: AgentRegistry) -> Result<Self> {
        config.validate()?;
        for id in registry.ids() {
            if !config.weights.contains(&id) {
                warn!(agent = %id, "Agent has no consensus weight; its findings will be excluded");
            }
        }

        let publisher = EventPublisher::new(config.store.publish_capacity);
        let store = Arc::new(InMemoryEventStore::new().with_publisher(publisher.clone()));
        info!(
            agents = registry.len(),
            min_confidence = config.consensus.min_confidence,
            "Coordinator created"
        );

        Ok(Self {
            weights: config.weights.clone(),
            engine: ConsensusEngine::new(config.consensus.clone()),
            degradation: DegradationManager::new(config.degradation.clone()),
            config: Arc::new(config),
            registry: Arc::new(registry),
            store,
            publisher,
            resolver: Arc::new(DryRunResolver::new()),
            alerter: Arc::new(LogAlerter),
            counters: Counters::default(),
        })
    }

    /// Create a coordinator whose store is built from the store configuration.
    pub async fn open(config: OrchestratorConfig, registry: AgentRegistry) -> Result<Self> {
        let mut coordinator = Self::new(config, registry)?;
        coordinator.store =
            create_event_store(&coordinator.config.store, coordinator.publisher.clone()).await?;
        Ok(coordinator)
    }

    /// Replace the event store. Build it with [`Self::publisher`] for
    /// [`Self::subscribe`] to see its events.
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResolutionExecutor>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_alerter(mut self, alerter: Arc<dyn EmergencyAlerter>) -> Self {
        self.alerter = alerter;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn publisher(&self) -> &EventPublisher {
        &self.publisher
    }

    /// Handle an incident end to end.
    ///
    /// Agent failures, low confidence and store trouble all end in a
    /// decision; only exhausting every degradation tier is an error.
    pub async fn handle_incident(&self, input: IncidentInput) -> Result<Decision> {
        let incident_id = input.id.clone().unwrap_or_else(IncidentId::generate);
        Counters::bump(&self.counters.incidents);
        info!(
            incident_id = %incident_id,
            severity = %input.severity,
            "Handling incident"
        );

        let registered = self.registry.ids();
        let mut best: Option<Decision> = None;
        let mut tier = DegradationTier::Full;

        loop {
            match tier {
                t if t.runs_agents() => {
                    if let Some(agents) = self.degradation.agents_for(tier, &registered) {
                        if tier != DegradationTier::Full {
                            self.enter_tier(&incident_id, tier, best.as_ref()).await;
                        }
                        match self.run_tier(&incident_id, &input, tier, agents).await {
                            Ok(TierOutcome::Completed(decision)) => return Ok(decision),
                            Ok(TierOutcome::Unusable(decision)) => {
                                if best.as_ref().map_or(true, |b| decision.responded > b.responded) {
                                    best = Some(decision);
                                }
                            }
                            Err(e) if e.is_store_failure() => {
                                // Another agent round could not be recorded either.
                                warn!(incident_id = %incident_id, tier = %tier, error = %e, "Store failed, skipping agent tiers");
                                tier = DegradationTier::HumanAssisted;
                                continue;
                            }
                            Err(e) => {
                                warn!(incident_id = %incident_id, tier = %tier, error = %e, "Tier failed");
                            }
                        }
                    } else {
                        debug!(incident_id = %incident_id, tier = %tier, "No agents for tier, skipping");
                    }
                }
                DegradationTier::HumanAssisted => {
                    self.enter_tier(&incident_id, tier, best.as_ref()).await;
                    match self.hand_to_human(&incident_id, &input, best.clone()).await {
                        Ok(decision) => return Ok(decision),
                        Err(e) => {
                            warn!(incident_id = %incident_id, error = %e, "Human hand-off failed");
                        }
                    }
                }
                _ => {
                    self.enter_tier(&incident_id, tier, best.as_ref()).await;
                    return Err(self.emergency(&incident_id, &input, best).await);
                }
            }
            tier = tier.next().unwrap_or(DegradationTier::Emergency);
        }
    }

    /// Current state of an incident, replayed and verified from the store.
    pub async fn get_status(&self, incident_id: &IncidentId) -> Result<IncidentState> {
        self.store.replay(incident_id).await
    }

    /// Full event history of an incident.
    pub async fn history(&self, incident_id: &IncidentId) -> Result<Vec<Event>> {
        self.store.events(incident_id, VersionRange::all()).await
    }

    pub fn agent_health(&self) -> Vec<AgentHealth> {
        self.registry.health()
    }

    /// Receive every event committed by the store.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.publisher.subscribe()
    }

    pub fn subscribe_breakers(&self) -> broadcast::Receiver<BreakerTransition> {
        self.registry.subscribe_transitions()
    }

    /// Forward committed events to an external sink.
    pub fn attach_sink(&self, sink: Arc<dyn AuditSink>) -> JoinHandle<()> {
        self.publisher.spawn_forwarder(sink)
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.counters.snapshot()
    }

    async fn run_tier(
        &self,
        incident_id: &IncidentId,
        input: &IncidentInput,
        tier: DegradationTier,
        agent_ids: Vec<String>,
    ) -> Result<TierOutcome> {
        let state = self.ensure_opened(incident_id, input).await?;
        let round = state.rounds + 1;
        let agents = self.registry.select(&agent_ids)?;

        self.append(
            incident_id,
            EventBody::AgentsDispatched {
                round,
                tier,
                agents: agent_ids.clone(),
            },
        )
        .await?;
        Counters::bump(&self.counters.rounds);

        let ctx = IncidentContext::new(incident_id.clone(), &state.description, state.severity)
            .with_signals(state.signals.clone())
            .with_round(round);
        let deadline = self
            .degradation
            .deadline_for(tier, self.config.round.round_deadline());
        let outcome = run_round(&agents, &ctx, self.config.round.agent_timeout(), deadline).await;
        info!(
            incident_id = %incident_id,
            round,
            tier = %tier,
            dispatched = agents.len(),
            responders = outcome.responders(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Round complete"
        );

        self.append(
            incident_id,
            EventBody::FindingsRecorded {
                round,
                findings: outcome.findings.clone(),
            },
        )
        .await?;

        let weights = self.weights.restricted_to(&agent_ids);
        let decision = self.engine.decide(&outcome.findings, &weights).with_tier(tier);
        if !self.degradation.accepts(tier, &decision) {
            return Ok(TierOutcome::Unusable(decision));
        }

        self.append(
            incident_id,
            EventBody::ConsensusEvaluated {
                round,
                decision: decision.clone(),
            },
        )
        .await?;
        info!(incident_id = %incident_id, decision = %decision.summary(), "Consensus reached");

        let decision = if decision.autonomous {
            Counters::bump(&self.counters.autonomous);
            self.resolve(incident_id, decision).await?
        } else {
            let reason = if decision.quorum_met {
                INSUFFICIENT_CONFIDENCE_NOTE.to_string()
            } else {
                "quorum not met".to_string()
            };
            self.escalate(incident_id, decision, &reason).await?
        };
        Ok(TierOutcome::Completed(decision))
    }

    async fn resolve(&self, incident_id: &IncidentId, decision: Decision) -> Result<Decision> {
        self.append(
            incident_id,
            EventBody::ResolutionStarted {
                action: decision.action,
            },
        )
        .await?;

        let outcome = tokio::time::timeout(
            self.config.round.resolution_timeout(),
            self.resolver.execute(incident_id, &decision),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(result)) if result.success => {
                info!(
                    incident_id = %incident_id,
                    action = %result.action,
                    summary = %result.summary,
                    "Incident resolved"
                );
                self.append(incident_id, EventBody::ResolutionCompleted { result })
                    .await?;
                Counters::bump(&self.counters.resolved);
                return Ok(decision);
            }
            Ok(Ok(result)) => format!("resolution reported failure: {}", result.summary),
            Ok(Err(e)) => format!("resolution failed: {}", e),
            Err(_) => "resolution timed out".to_string(),
        };

        warn!(incident_id = %incident_id, reason = %failure, "Resolution did not complete");
        let decision = decision.with_note(&failure);
        self.escalate(incident_id, decision, &failure).await
    }

    async fn escalate(
        &self,
        incident_id: &IncidentId,
        decision: Decision,
        reason: &str,
    ) -> Result<Decision> {
        self.append(
            incident_id,
            EventBody::Escalated {
                reason: reason.to_string(),
                decision: Some(decision.clone()),
            },
        )
        .await?;
        Counters::bump(&self.counters.escalated);
        info!(
            incident_id = %incident_id,
            reason,
            confidence = decision.confidence,
            "Incident escalated"
        );
        Ok(decision)
    }

    async fn hand_to_human(
        &self,
        incident_id: &IncidentId,
        input: &IncidentInput,
        best: Option<Decision>,
    ) -> Result<Decision> {
        let configured = self.weights.restricted_to(&self.registry.ids()).len();
        let decision = best
            .unwrap_or_else(|| Decision::no_response(configured))
            .for_human();
        self.ensure_opened(incident_id, input).await?;
        self.escalate(incident_id, decision, INSUFFICIENT_CONFIDENCE_NOTE)
            .await
    }

    /// Last resort: alert out of band and report failure.
    async fn emergency(
        &self,
        incident_id: &IncidentId,
        input: &IncidentInput,
        best: Option<Decision>,
    ) -> Error {
        Counters::bump(&self.counters.emergencies);
        error!(incident_id = %incident_id, reason = EMERGENCY_REASON, "Emergency escalation");

        let alert = EmergencyAlert::new(incident_id.clone(), &input.description, EMERGENCY_REASON)
            .with_decision(best);
        match tokio::time::timeout(self.config.round.resolution_timeout(), self.alerter.alert(&alert))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(incident_id = %incident_id, error = %e, "Emergency alert failed"),
            Err(_) => error!(incident_id = %incident_id, "Emergency alert timed out"),
        }

        Error::CoordinationFailed {
            incident_id: incident_id.to_string(),
            reason: EMERGENCY_REASON.to_string(),
        }
    }

    /// Record a tier change. Failure to record does not stop the ladder.
    async fn enter_tier(
        &self,
        incident_id: &IncidentId,
        tier: DegradationTier,
        previous: Option<&Decision>,
    ) {
        Counters::bump(&self.counters.degraded);
        let reason = self.degradation.entry_reason(tier, previous);
        warn!(incident_id = %incident_id, tier = %tier, reason = %reason, "Entering degradation tier");

        let recorded = match self.timed(self.store.current_version(incident_id)).await {
            Ok(0) => return,
            Ok(_) => {
                self.append(incident_id, EventBody::DegradationTierEntered { tier, reason })
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            debug!(incident_id = %incident_id, tier = %tier, error = %e, "Tier entry not recorded");
        }
    }

    /// Make sure the incident exists in the store and return its state.
    async fn ensure_opened(
        &self,
        incident_id: &IncidentId,
        input: &IncidentInput,
    ) -> Result<IncidentState> {
        let version = self.timed(self.store.current_version(incident_id)).await?;
        if version == 0 {
            let body = EventBody::IncidentDetected {
                description: input.description.clone(),
                severity: input.severity,
                signals: input.signals.clone(),
            };
            match self.timed(self.store.append(incident_id, 0, body)).await {
                Ok(_) | Err(Error::VersionConflict { .. }) => {}
                Err(e) => return Err(e),
            }
        } else {
            debug!(incident_id = %incident_id, version, "Resuming incident from store");
        }
        self.timed(self.store.replay(incident_id)).await
    }

    async fn append(&self, incident_id: &IncidentId, body: EventBody) -> Result<u64> {
        append_with_retry(self.store.as_ref(), incident_id, body, &self.config.store.retry).await
    }

    async fn timed<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.store.retry.append_timeout(), operation)
            .await
            .unwrap_or(Err(Error::StoreTimeout))
    }
}
