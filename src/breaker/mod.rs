//! Circuit Breaker Module
//!
//! Per-agent failure gate:
//! - Consecutive-failure threshold within a rolling window
//! - Lazy cooldown to a single half-open trial call
//! - Injected clock for deterministic tests

pub mod circuit;
pub mod clock;

pub use circuit::{
    BreakerConfig, BreakerSnapshot, BreakerTransition, CallPermit, CircuitBreaker, CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
