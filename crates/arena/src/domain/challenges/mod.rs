mod engine;
mod leaderboard;
mod progress;
mod repository;
mod rewards;
mod store;
mod teams;

pub use engine::*;
pub use leaderboard::*;
pub use progress::*;
pub use repository::*;
pub use rewards::*;
pub use store::*;
pub use teams::*;

use arena_core::{
    Achievement, Challenge, ChallengeStatus, DepartedParticipant, LeaderboardEntry, Participant,
    Team, TeamStanding,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

use super::Error;

/// Everything the engine knows about one challenge.
///
/// Loaded, mutated and saved as a single unit so a failed operation never
/// leaves part of its changes behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub challenge: Challenge,
    /// Live roster keyed by user id
    pub participants: BTreeMap<String, Participant>,
    /// Participants who left, kept as history
    pub departed: Vec<DepartedParticipant>,
    pub teams: BTreeMap<String, Team>,
    pub achievements: Vec<Achievement>,
    /// Cache of the latest ranking pass
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Cache of the latest team aggregation pass
    pub team_standings: Vec<TeamStanding>,
    /// Set once the final standings and rank rewards have been issued
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finalized_at: Option<OffsetDateTime>,
}

impl ChallengeRecord {
    pub fn new(challenge: Challenge) -> Self {
        Self {
            challenge,
            participants: BTreeMap::new(),
            departed: vec![],
            teams: BTreeMap::new(),
            achievements: vec![],
            leaderboard: vec![],
            team_standings: vec![],
            finalized_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.challenge.id
    }

    pub fn status(&self, now: OffsetDateTime) -> ChallengeStatus {
        self.challenge.status_at(now)
    }

    /// Fails with `ChallengeClosed` once the challenge is completed or cancelled
    pub fn ensure_open(&self, now: OffsetDateTime) -> Result<ChallengeStatus, Error> {
        let status = self.status(now);
        if status.is_terminal() {
            return Err(Error::closed(self.id(), status));
        }
        Ok(status)
    }

    /// Completed by the clock but final standings not yet issued
    pub fn needs_finalization(&self, now: OffsetDateTime) -> bool {
        self.finalized_at.is_none() && self.status(now) == ChallengeStatus::Completed
    }

    pub fn has_achievement(&self, user_id: &str, reward_id: &str) -> bool {
        self.achievements
            .iter()
            .any(|a| a.matches(user_id, self.id(), reward_id))
    }

    pub fn summary(&self, now: OffsetDateTime) -> ChallengeSummary {
        ChallengeSummary {
            challenge: self.challenge.clone(),
            status: self.status(now),
            participant_count: self.participants.len(),
            team_count: self.teams.len(),
            finalized_at: self.finalized_at,
        }
    }
}

/// Challenge as presented to API consumers, with its derived status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSummary {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub status: ChallengeStatus,
    pub participant_count: usize,
    pub team_count: usize,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finalized_at: Option<OffsetDateTime>,
}
