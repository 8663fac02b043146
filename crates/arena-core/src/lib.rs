//! arena-core: Shared types for the challenge engine and its API consumers
//!
//! This crate holds the challenge data model, the status derivation rule and
//! the validation applied when a challenge is authored.

pub mod errors;
pub mod types;
pub mod validation;

pub use errors::*;
pub use types::*;
pub use validation::*;
