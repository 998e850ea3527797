//! Core utilities and common types for BICO.

pub mod error;
pub mod hash;
pub mod types;

pub use error::{Error, Result};
pub use hash::sha3_256_multi;
pub use types::*;
