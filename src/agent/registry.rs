//! Agent registry.
//!
//! Agents are registered once at startup; each gets its own circuit breaker.

use crate::agent::interface::Agent;
use crate::breaker::{
    BreakerConfig, BreakerSnapshot, BreakerTransition, CircuitBreaker, CircuitState, Clock,
    SystemClock,
};
use crate::core::{now, Error, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const TRANSITION_CHANNEL_CAPACITY: usize = 256;

/// A registered agent and the breaker guarding it.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub agent: Arc<dyn Agent>,
    pub breaker: Arc<CircuitBreaker>,
    pub registered_at: Timestamp,
}

impl RegisteredAgent {
    pub fn id(&self) -> &str {
        self.agent.id()
    }
}

impl std::fmt::Debug for RegisteredAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredAgent")
            .field("id", &self.agent.id())
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// Health of one agent as seen through its breaker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub description: String,
    pub circuit: BreakerSnapshot,
}

impl AgentHealth {
    /// Whether the agent will currently be called.
    pub fn is_available(&self) -> bool {
        self.circuit.state != CircuitState::Open
    }
}

/// Registry of agents, in registration order.
pub struct AgentRegistry {
    agents: Vec<RegisteredAgent>,
    index: HashMap<String, usize>,
    breaker_config: BreakerConfig,
    clock: Arc<dyn Clock>,
    transitions: broadcast::Sender<BreakerTransition>,
}

impl AgentRegistry {
    /// Create a registry whose breakers use the given configuration.
    pub fn new(breaker_config: BreakerConfig) -> Self {
        Self::with_clock(breaker_config, Arc::new(SystemClock))
    }

    /// Create a registry whose breakers read time from `clock`.
    pub fn with_clock(breaker_config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        Self {
            agents: Vec::new(),
            index: HashMap::new(),
            breaker_config,
            clock,
            transitions,
        }
    }

    /// Register an agent.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.id().to_string();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateAgent(id));
        }

        let breaker = CircuitBreaker::with_clock(&id, self.breaker_config.clone(), self.clock.clone())
            .with_notifier(self.transitions.clone());

        self.index.insert(id, self.agents.len());
        self.agents.push(RegisteredAgent {
            agent,
            breaker: Arc::new(breaker),
            registered_at: now(),
        });
        Ok(())
    }

    /// Builder-style registration.
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Result<Self> {
        self.register(agent)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredAgent> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All agents in registration order.
    pub fn all(&self) -> &[RegisteredAgent] {
        &self.agents
    }

    /// The named subset, in registration order. Unknown ids are an error.
    pub fn select(&self, ids: &[String]) -> Result<Vec<RegisteredAgent>> {
        if let Some(missing) = ids.iter().find(|id| !self.contains(id)) {
            return Err(Error::UnknownAgent(missing.clone()));
        }
        Ok(self
            .agents
            .iter()
            .filter(|a| ids.iter().any(|id| id == a.id()))
            .cloned()
            .collect())
    }

    pub fn ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Health of every agent.
    pub fn health(&self) -> Vec<AgentHealth> {
        self.agents
            .iter()
            .map(|a| AgentHealth {
                agent_id: a.id().to_string(),
                description: a.agent.description().to_string(),
                circuit: a.breaker.snapshot(),
            })
            .collect()
    }

    /// Receive breaker state transitions for all agents.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<BreakerTransition> {
        self.transitions.subscribe()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
