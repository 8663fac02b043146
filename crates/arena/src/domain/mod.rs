mod activity;
mod challenges;
mod clock;

pub use activity::*;
pub use challenges::*;
pub use clock::*;

use arena_core::{ChallengeStatus, CoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),
    #[error("challenge not found: {0}")]
    UnknownChallenge(String),
    #[error("user {user_id} already joined challenge {challenge_id}")]
    DuplicateParticipant {
        challenge_id: String,
        user_id: String,
    },
    #[error("challenge {challenge_id} is full, max participants is {max_participants}")]
    CapacityExceeded {
        challenge_id: String,
        max_participants: usize,
    },
    #[error("challenge {challenge_id} is {status} and accepts no further changes")]
    ChallengeClosed {
        challenge_id: String,
        status: ChallengeStatus,
    },
    #[error("user {user_id} has not joined challenge {challenge_id}")]
    UnknownParticipant {
        challenge_id: String,
        user_id: String,
    },
    #[error("requirement {requirement_id} not found in challenge {challenge_id}")]
    UnknownRequirement {
        challenge_id: String,
        requirement_id: String,
    },
    #[error("progress delta must be a non-negative number that keeps progress finite, got {0}")]
    InvalidProgressDelta(f64),
    #[error("team {team_id} not found in challenge {challenge_id}")]
    UnknownTeam {
        challenge_id: String,
        team_id: String,
    },
    #[error("{0}")]
    TeamNotAllowed(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("background thread died: {0}")]
    Thread(String),
}

impl From<CoreError> for Error {
    fn from(value: CoreError) -> Self {
        Error::InvalidChallenge(value.to_string())
    }
}

impl Error {
    pub(crate) fn closed(challenge_id: &str, status: ChallengeStatus) -> Self {
        Error::ChallengeClosed {
            challenge_id: challenge_id.to_string(),
            status,
        }
    }

    pub(crate) fn unknown_participant(challenge_id: &str, user_id: &str) -> Self {
        Error::UnknownParticipant {
            challenge_id: challenge_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}
