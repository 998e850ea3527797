//! Monitoring Module
//!
//! Observability for BICO:
//! - Structured logging via `tracing`

pub mod logging;

pub use logging::{init_tracing, LogConfig, LogFormat, LogLevel};
