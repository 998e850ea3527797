//! Fan-out/fan-in of a single consensus round.
//!
//! Every agent runs in its own task behind its breaker and a per-agent
//! timeout. Collection stops at the round deadline; whatever is still running
//! is aborted, counted against its breaker and reported as a failed finding.

use crate::agent::{AgentFinding, IncidentContext, RegisteredAgent};
use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Timing limits for rounds and resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// Hard limit for one agent invocation
    pub agent_timeout_ms: u64,
    /// Limit for a whole round, after which late agents are dropped
    pub round_deadline_ms: u64,
    /// Limit for the resolution collaborator
    pub resolution_timeout_ms: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 30_000,
            round_deadline_ms: 120_000,
            resolution_timeout_ms: 60_000,
        }
    }
}

impl RoundConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn round_deadline(&self) -> Duration {
        Duration::from_millis(self.round_deadline_ms)
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_ms == 0 || self.round_deadline_ms == 0 || self.resolution_timeout_ms == 0 {
            return Err(Error::InvalidConfig("round timeouts must be > 0".into()));
        }
        Ok(())
    }
}

/// Findings gathered by one round, one per dispatched agent.
#[derive(Clone, Debug)]
pub struct RoundOutcome {
    /// Findings in dispatch order
    pub findings: Vec<AgentFinding>,
    /// Agents cut off by the round deadline
    pub late: Vec<String>,
    pub elapsed: Duration,
}

impl RoundOutcome {
    pub fn responders(&self) -> usize {
        self.findings.iter().filter(|f| f.responded()).count()
    }
}

/// Invoke `agents` concurrently and gather their findings.
///
/// Never fails: every agent yields exactly one finding, failed or not.
pub async fn run_round(
    agents: &[RegisteredAgent],
    ctx: &IncidentContext,
    agent_timeout: Duration,
    round_deadline: Duration,
) -> RoundOutcome {
    let started = Instant::now();
    let deadline = deadline_after(started, round_deadline);
    let mut tasks = JoinSet::new();

    for registered in agents {
        let agent = registered.agent.clone();
        let breaker = registered.breaker.clone();
        let ctx = ctx.clone();
        let agent_id = registered.id().to_string();
        let agent_deadline = deadline_after(started, agent_timeout).min(deadline);

        tasks.spawn(async move {
            let begin = Instant::now();
            let result = breaker
                .call(async {
                    match tokio::time::timeout_at(agent_deadline, agent.invoke(&ctx, agent_deadline))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::AgentTimeout(agent_id.clone())),
                    }
                })
                .await;
            let latency_ms = begin.elapsed().as_millis() as u64;

            let finding = match result {
                Ok(finding) if !finding.confidence.is_finite() => {
                    warn!(agent = %agent_id, "Agent reported non-finite confidence");
                    AgentFinding::failed(&agent_id, "non-finite confidence", latency_ms)
                }
                Ok(mut finding) => {
                    finding.agent_id = agent_id.clone();
                    finding.with_latency(latency_ms)
                }
                Err(e) => {
                    debug!(agent = %agent_id, error = %e, "Agent produced no finding");
                    AgentFinding::failed(&agent_id, &e.to_string(), latency_ms)
                }
            };
            (agent_id, finding)
        });
    }

    let mut collected: HashMap<String, AgentFinding> = HashMap::with_capacity(agents.len());
    let mut cut_off = false;
    loop {
        match tokio::time::timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((agent_id, finding)))) => {
                collected.insert(agent_id, finding);
            }
            Ok(Some(Err(e))) => {
                warn!(incident_id = %ctx.incident_id, error = %e, "Agent task aborted");
            }
            Ok(None) => break,
            Err(_) => {
                tasks.abort_all();
                cut_off = true;
                break;
            }
        }
    }

    // Drain the aborted set so every permit is settled or dropped before the
    // late agents are charged. Tasks that finished in the meantime keep their
    // finding.
    if cut_off {
        while let Some(joined) = tasks.join_next().await {
            if let Ok((agent_id, finding)) = joined {
                collected.insert(agent_id, finding);
            }
        }
    }

    let elapsed = started.elapsed();
    let mut late = Vec::new();
    let findings = agents
        .iter()
        .map(|registered| {
            let agent_id = registered.id();
            collected.remove(agent_id).unwrap_or_else(|| {
                late.push(agent_id.to_string());
                registered.breaker.record_failure();
                let reason = Error::RoundDeadlineExceeded(agent_id.to_string()).to_string();
                AgentFinding::failed(agent_id, &reason, elapsed.as_millis() as u64)
            })
        })
        .collect();

    if !late.is_empty() {
        warn!(
            incident_id = %ctx.incident_id,
            round = ctx.round,
            late = ?late,
            "Round deadline cut off agents"
        );
    }

    RoundOutcome {
        findings,
        late,
        elapsed,
    }
}

fn deadline_after(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::breaker::{BreakerConfig, CircuitState};
    use crate::core::IncidentId;
    use crate::incident::Severity;
    use crate::test_support::ScriptedAgent;

    fn ctx() -> IncidentContext {
        IncidentContext::new(IncidentId::new("inc-r"), "cpu saturation", Severity::High)
    }

    #[tokio::test]
    async fn test_all_agents_respond_in_order() {
        let registry = AgentRegistry::new(BreakerConfig::default())
            .with_agent(ScriptedAgent::responding("b", 0.8))
            .unwrap()
            .with_agent(ScriptedAgent::responding("a", 0.6))
            .unwrap();

        let outcome = run_round(
            registry.all(),
            &ctx(),
            Duration::from_secs(1),
            Duration::from_secs(2),
        )
        .await;
        let ids: Vec<&str> = outcome.findings.iter().map(|f| f.agent_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(outcome.responders(), 2);
        assert!(outcome.late.is_empty());
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_become_failed_findings() {
        let registry = AgentRegistry::new(BreakerConfig::default())
            .with_agent(ScriptedAgent::responding("ok", 0.9))
            .unwrap()
            .with_agent(ScriptedAgent::failing("broken"))
            .unwrap()
            .with_agent(ScriptedAgent::slow("slow", 0.9, Duration::from_secs(5)))
            .unwrap();

        let outcome = run_round(
            registry.all(),
            &ctx(),
            Duration::from_millis(50),
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(outcome.responders(), 1);
        assert!(outcome.findings[1].failure.is_some());
        assert!(outcome.findings[2]
            .failure
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert!(outcome.late.is_empty());
    }

    #[tokio::test]
    async fn test_round_deadline_aborts_late_agents() {
        let slow = ScriptedAgent::slow("slow", 0.9, Duration::from_secs(5));
        let registry = AgentRegistry::new(BreakerConfig::default())
            .with_agent(ScriptedAgent::responding("fast", 0.7))
            .unwrap()
            .with_agent(slow.clone())
            .unwrap();

        let outcome = run_round(
            registry.all(),
            &ctx(),
            Duration::from_secs(10),
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(outcome.late, vec!["slow".to_string()]);
        assert_eq!(
            outcome.findings[1].failure,
            Some(Error::RoundDeadlineExceeded("slow".into()).to_string())
        );
        assert!(outcome.elapsed < Duration::from_secs(5));
        let snapshot = registry.get("slow").unwrap().breaker.snapshot();
        assert_eq!(snapshot.total_failures, 1);
    }

    #[tokio::test]
    async fn test_open_breaker_skips_agent() {
        let agent = ScriptedAgent::responding("guarded", 0.9);
        let registry = AgentRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        })
        .with_agent(agent.clone())
        .unwrap();
        let breaker = registry.get("guarded").unwrap().breaker.clone();
        breaker.try_acquire().unwrap().fail();
        assert_eq!(breaker.state(), CircuitState::Open);

        let outcome = run_round(
            registry.all(),
            &ctx(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.responders(), 0);
        assert_eq!(agent.calls(), 0);
        assert!(outcome.findings[0]
            .failure
            .as_deref()
            .unwrap()
            .contains("Circuit open"));
    }

    #[tokio::test]
    async fn test_non_finite_confidence_is_not_a_vote() {
        let registry = AgentRegistry::new(BreakerConfig::default())
            .with_agent(ScriptedAgent::responding("nan", f32::NAN))
            .unwrap();

        let outcome = run_round(
            registry.all(),
            &ctx(),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.responders(), 0);
        assert_eq!(outcome.findings[0].confidence, 0.0);
        assert!(serde_json::to_string(&outcome.findings[0]).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_on_round_deadline_counts_once() {
        for _ in 0..10 {
            let registry = AgentRegistry::new(BreakerConfig::default())
                .with_agent(ScriptedAgent::slow("hung", 0.9, Duration::from_secs(5)))
                .unwrap();

            let outcome = run_round(
                registry.all(),
                &ctx(),
                Duration::from_millis(50),
                Duration::from_millis(50),
            )
            .await;
            assert_eq!(outcome.responders(), 0);
            assert!(outcome.findings[0].failure.is_some());
            let snapshot = registry.get("hung").unwrap().breaker.snapshot();
            assert_eq!(snapshot.total_failures, 1);
        }
    }

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() {
        let registry = AgentRegistry::new(BreakerConfig::default())
            .with_agent(ScriptedAgent::responding("a", 0.8))
            .unwrap();

        let outcome = run_round(registry.all(), &ctx(), Duration::MAX, Duration::MAX).await;
        assert_eq!(outcome.responders(), 1);
        assert!(outcome.late.is_empty());
    }
}
