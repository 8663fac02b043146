use arena_core::{
    validate_challenge, Achievement, Challenge, ChallengeStatus, ChallengeType, CreateChallenge,
    DepartedParticipant, Participant, Team,
};
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ChallengeRecord, ChallengeRepository};
use crate::domain::Error;

/// Keyed access to challenge records with writes serialized per challenge.
///
/// Operations on different challenges never contend; operations on the same
/// challenge run one at a time for as long as the caller holds the guard
/// returned by [`ChallengeStore::lock`]. Only locks that are held or awaited
/// stay in the map.
pub struct ChallengeStore {
    repository: Arc<dyn ChallengeRepository>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl ChallengeStore {
    pub fn new(repository: Arc<dyn ChallengeRepository>) -> Self {
        Self {
            repository,
            locks: DashMap::new(),
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.repository.ping().await
    }

    pub async fn lock(&self, challenge_id: &str) -> OwnedMutexGuard<()> {
        // an entry only the map references has no holder and no waiter
        self.locks
            .retain(|_, challenge_lock| Arc::strong_count(challenge_lock) > 1);

        let challenge_lock = self
            .locks
            .entry(challenge_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        challenge_lock.lock_owned().await
    }

    /// Validate and insert a new challenge, its status derived from the dates
    pub async fn create(
        &self,
        create: CreateChallenge,
        now: OffsetDateTime,
    ) -> Result<ChallengeRecord, Error> {
        validate_challenge(&create)?;

        let id = create
            .id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let _guard = self.lock(&id).await;

        let record = ChallengeRecord::new(Challenge::new(id.clone(), create, now));
        if !self.repository.insert_challenge(&record).await? {
            return Err(Error::InvalidChallenge(format!(
                "challenge {} already exists",
                id
            )));
        }

        info!(
            "created challenge {} ({}), status {}",
            id,
            record.challenge.title,
            record.status(now)
        );
        Ok(record)
    }

    pub async fn load(&self, challenge_id: &str) -> Result<ChallengeRecord, Error> {
        self.repository
            .get_record(challenge_id)
            .await?
            .ok_or_else(|| Error::UnknownChallenge(challenge_id.to_string()))
    }

    pub async fn save(&self, record: &ChallengeRecord) -> Result<(), Error> {
        debug!(
            "saving challenge {} with {} participants",
            record.id(),
            record.participants.len()
        );
        self.repository.save_record(record).await
    }

    pub async fn list(&self) -> Result<Vec<ChallengeRecord>, Error> {
        self.repository.list_records().await
    }

    pub async fn for_user(&self, user_id: &str) -> Result<Vec<ChallengeRecord>, Error> {
        self.repository.challenges_for_user(user_id).await
    }

    pub async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>, Error> {
        self.repository.achievements_for_user(user_id).await
    }

    pub async fn pending_finalization(&self, now: OffsetDateTime) -> Result<Vec<String>, Error> {
        self.repository.pending_finalization(now).await
    }
}

impl ChallengeRecord {
    /// Enroll a user, checking status, duplicates, capacity and team tag
    pub fn join(
        &mut self,
        user_id: &str,
        team: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<&Participant, Error> {
        self.ensure_open(now)?;

        if self.participants.contains_key(user_id) {
            return Err(Error::DuplicateParticipant {
                challenge_id: self.id().to_string(),
                user_id: user_id.to_string(),
            });
        }

        if let Some(max_participants) = self.challenge.max_participants {
            if self.participants.len() >= max_participants {
                return Err(Error::CapacityExceeded {
                    challenge_id: self.id().to_string(),
                    max_participants,
                });
            }
        }

        if let Some(team_id) = team {
            if self.challenge.challenge_type != ChallengeType::Team {
                return Err(Error::TeamNotAllowed(format!(
                    "challenge {} is not a team challenge",
                    self.id()
                )));
            }
            let challenge_id = self.challenge.id.clone();
            let team = self
                .teams
                .get_mut(team_id)
                .ok_or_else(|| Error::UnknownTeam {
                    challenge_id,
                    team_id: team_id.to_string(),
                })?;
            team.members.insert(user_id.to_string());
        }

        let participant = self
            .participants
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Participant::new(user_id.to_string(), team.map(str::to_string), now)
            });
        Ok(participant)
    }

    /// Remove a user from the live roster, keeping their record as history
    pub fn leave(&mut self, user_id: &str, now: OffsetDateTime) -> Result<Participant, Error> {
        self.ensure_open(now)?;

        let participant = self
            .participants
            .remove(user_id)
            .ok_or_else(|| Error::unknown_participant(self.id(), user_id))?;

        if let Some(team) = participant
            .team
            .as_deref()
            .and_then(|team_id| self.teams.get_mut(team_id))
        {
            team.members.remove(user_id);
        }

        self.departed.push(DepartedParticipant {
            participant: participant.clone(),
            left_at: now,
        });
        Ok(participant)
    }

    /// Force the challenge into the terminal cancelled state
    pub fn cancel(&mut self, now: OffsetDateTime) -> Result<ChallengeStatus, Error> {
        let previous = self.ensure_open(now)?;
        self.challenge.cancelled_at = Some(now);
        Ok(previous)
    }

    /// Create a team, returning the existing one if the id is taken
    pub fn add_team(&mut self, team_id: &str, now: OffsetDateTime) -> Result<&Team, Error> {
        if self.challenge.challenge_type != ChallengeType::Team {
            return Err(Error::TeamNotAllowed(format!(
                "challenge {} is not a team challenge",
                self.id()
            )));
        }
        if team_id.trim().is_empty() {
            return Err(Error::TeamNotAllowed(String::from(
                "team id cannot be empty",
            )));
        }
        self.ensure_open(now)?;

        Ok(self
            .teams
            .entry(team_id.to_string())
            .or_insert_with(|| Team::new(team_id.to_string(), now)))
    }
}
