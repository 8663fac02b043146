//! Shared error types

use thiserror::Error;

/// Errors raised while validating challenge definitions
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("invalid reward: {0}")]
    InvalidReward(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
