use arena_core::{
    Achievement, ActivityEvent, ChallengeStatus, ChallengeType, CreateChallenge, LeaderboardEntry,
    Participant, RewardCondition, Team, TeamStanding,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::{
    recompute_teams, ChallengeRecord, ChallengeStore, ChallengeSummary, LeaderboardRanker,
    ProgressUpdate,
};
use crate::domain::{normalize, Clock, Error, MetricMappings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub participant: Participant,
    /// Participation rewards granted by the join
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressOutcome {
    #[serde(flatten)]
    pub update: ProgressUpdate,
    /// Completion rewards granted by this update
    pub achievements: Vec<Achievement>,
    /// Rank after the leaderboard recompute
    pub rank: Option<usize>,
}

/// Periodically issues final standings for challenges past their end date
pub struct ChallengeWatcher {
    engine: Arc<ChallengeEngine>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl ChallengeWatcher {
    pub fn new(
        engine: Arc<ChallengeEngine>,
        cancel_token: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            interval,
            cancel_token,
        }
    }

    pub async fn watch(&self) -> Result<(), anyhow::Error> {
        info!("Starting challenge finalization watcher");

        loop {
            if self.cancel_token.is_cancelled() {
                info!("Challenge watcher received cancellation");
                break;
            }

            match self.engine.finalize_ended_challenges().await {
                Ok(finalized) if !finalized.is_empty() => {
                    info!("Finalized challenges: {:?}", finalized);
                }
                Ok(_) => debug!("No challenges waiting for finalization"),
                Err(e) => error!("Challenge finalization error: {}", e),
            }

            tokio::select! {
                _ = sleep(self.interval) => continue,
                _ = self.cancel_token.cancelled() => {
                    info!("Challenge watcher cancelled during sleep");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Entry point for every challenge operation.
///
/// Each write runs under the challenge's lock against a copy of the stored
/// record: the copy is saved only when the whole operation succeeds.
pub struct ChallengeEngine {
    store: Arc<ChallengeStore>,
    ranker: LeaderboardRanker,
    clock: Arc<dyn Clock>,
    metric_mappings: MetricMappings,
}

impl ChallengeEngine {
    pub fn new(
        store: Arc<ChallengeStore>,
        ranker: LeaderboardRanker,
        clock: Arc<dyn Clock>,
        metric_mappings: MetricMappings,
    ) -> Self {
        Self {
            store,
            ranker,
            clock,
            metric_mappings,
        }
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.store.ping().await
    }

    /// Run `operation` as one atomic unit on the challenge.
    ///
    /// A challenge found completed but not yet finalized is finalized first;
    /// that result is kept even when `operation` itself fails.
    async fn transact<T, F>(&self, challenge_id: &str, operation: F) -> Result<T, Error>
    where
        F: FnOnce(&mut ChallengeRecord, OffsetDateTime) -> Result<T, Error>,
    {
        let _guard = self.store.lock(challenge_id).await;
        let now = self.clock.now();
        let stored = self.store.load(challenge_id).await?;

        let mut base = stored.clone();
        if base.needs_finalization(now) {
            self.finalize(&mut base, now);
        }

        let mut working = base.clone();
        match operation(&mut working, now) {
            Ok(value) => {
                if working != stored {
                    self.store.save(&working).await?;
                }
                Ok(value)
            }
            Err(e) => {
                if base != stored {
                    self.store.save(&base).await?;
                }
                Err(e)
            }
        }
    }

    fn refresh_standings(&self, record: &mut ChallengeRecord) {
        record.leaderboard = self
            .ranker
            .recompute(&record.challenge, record.participants.values());
        if record.challenge.challenge_type == ChallengeType::Team {
            record.team_standings = recompute_teams(&mut record.teams, &record.leaderboard);
        }
        debug!(
            "recomputed standings for challenge {}: {} entries, {} teams",
            record.id(),
            record.leaderboard.len(),
            record.team_standings.len()
        );
    }

    fn finalize(&self, record: &mut ChallengeRecord, now: OffsetDateTime) -> Vec<Achievement> {
        self.refresh_standings(record);
        record.finalized_at = Some(now);
        let granted = record.award_rank_rewards(now);
        info!(
            "finalized challenge {} with {} participants, {} rank rewards issued",
            record.id(),
            record.leaderboard.len(),
            granted.len()
        );
        granted
    }

    fn apply_progress_unit(
        &self,
        record: &mut ChallengeRecord,
        user_id: &str,
        requirement_id: &str,
        delta: f64,
        now: OffsetDateTime,
    ) -> Result<ProgressOutcome, Error> {
        let update = record.apply_progress(user_id, requirement_id, delta, now)?;
        debug!(
            "progress {} {} -> {} for user {} in challenge {}",
            requirement_id,
            delta,
            update.progress,
            user_id,
            record.id()
        );

        let achievements = if update.newly_completed {
            info!("user {} completed challenge {}", user_id, record.id());
            record.award_for_condition(user_id, RewardCondition::Completion, now)
        } else {
            vec![]
        };

        self.refresh_standings(record);
        let rank = record
            .leaderboard
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.rank);

        Ok(ProgressOutcome {
            update,
            achievements,
            rank,
        })
    }

    pub async fn create_challenge(&self, create: CreateChallenge) -> Result<ChallengeSummary, Error> {
        let now = self.clock.now();
        let record = self.store.create(create, now).await?;
        Ok(record.summary(now))
    }

    pub async fn create_team(&self, challenge_id: &str, team_id: &str) -> Result<Team, Error> {
        self.transact(challenge_id, |record, now| {
            let team = record.add_team(team_id, now)?.clone();
            self.refresh_standings(record);
            info!("team {} ready in challenge {}", team_id, record.id());
            Ok(team)
        })
        .await
    }

    pub async fn join(
        &self,
        challenge_id: &str,
        user_id: &str,
        team: Option<&str>,
    ) -> Result<JoinOutcome, Error> {
        self.transact(challenge_id, |record, now| {
            let participant = record.join(user_id, team, now)?.clone();
            let achievements =
                record.award_for_condition(user_id, RewardCondition::Participation, now);
            self.refresh_standings(record);
            info!(
                "user {} joined challenge {} ({} participants)",
                user_id,
                record.id(),
                record.participants.len()
            );
            Ok(JoinOutcome {
                participant,
                achievements,
            })
        })
        .await
    }

    pub async fn leave(&self, challenge_id: &str, user_id: &str) -> Result<Participant, Error> {
        self.transact(challenge_id, |record, now| {
            let participant = record.leave(user_id, now)?;
            self.refresh_standings(record);
            info!("user {} left challenge {}", user_id, record.id());
            Ok(participant)
        })
        .await
    }

    pub async fn cancel(&self, challenge_id: &str) -> Result<ChallengeSummary, Error> {
        self.transact(challenge_id, |record, now| {
            let previous = record.cancel(now)?;
            info!("cancelled challenge {} (was {})", record.id(), previous);
            Ok(record.summary(now))
        })
        .await
    }

    /// Add `delta` to one requirement, then issue rewards and recompute
    /// standings, all in one unit
    pub async fn update_progress(
        &self,
        challenge_id: &str,
        user_id: &str,
        requirement_id: &str,
        delta: f64,
    ) -> Result<ProgressOutcome, Error> {
        self.transact(challenge_id, |record, now| {
            self.apply_progress_unit(record, user_id, requirement_id, delta, now)
        })
        .await
    }

    /// Returns only the achievements created by this call
    pub async fn award_if_eligible(
        &self,
        challenge_id: &str,
        user_id: &str,
    ) -> Result<Vec<Achievement>, Error> {
        self.transact(challenge_id, |record, now| {
            if !record.participants.contains_key(user_id) {
                return Err(Error::unknown_participant(record.id(), user_id));
            }
            Ok(record.award_if_eligible(user_id, now))
        })
        .await
    }

    /// Route an activity sample into every active challenge the user has
    /// joined with a requirement of the mapped type.
    ///
    /// Failures in one challenge are logged and do not stop the others.
    pub async fn handle_activity_event(
        &self,
        event: &ActivityEvent,
    ) -> Result<Vec<ProgressUpdate>, Error> {
        if !event.value.is_finite() || event.value < 0.0 {
            return Err(Error::InvalidProgressDelta(event.value));
        }

        let Some(requirement_type) = self.metric_mappings.requirement_type(&event.metric_type)
        else {
            warn!(
                "no requirement type mapped for metric {}, skipping event from user {}",
                event.metric_type, event.user_id
            );
            return Ok(vec![]);
        };

        let mut applied = vec![];
        for record in self.store.for_user(&event.user_id).await? {
            let challenge_id = record.id().to_string();
            let result = self
                .transact(&challenge_id, |record, now| {
                    if record.status(now) != ChallengeStatus::Active
                        || !record.challenge.contains(event.timestamp)
                    {
                        return Ok(vec![]);
                    }

                    let requirement_ids: Vec<String> = record
                        .challenge
                        .requirements
                        .iter()
                        .filter(|r| normalize(&r.requirement_type) == requirement_type)
                        .map(|r| r.id.clone())
                        .collect();

                    let mut updates = vec![];
                    for requirement_id in requirement_ids {
                        let outcome = self.apply_progress_unit(
                            record,
                            &event.user_id,
                            &requirement_id,
                            event.value,
                            now,
                        )?;
                        updates.push(outcome.update);
                    }
                    Ok(updates)
                })
                .await;

            match result {
                Ok(updates) => applied.extend(updates),
                Err(e) => warn!(
                    "skipping {} event for user {} in challenge {}: {}",
                    event.metric_type, event.user_id, challenge_id, e
                ),
            }
        }

        Ok(applied)
    }

    pub async fn get_challenge(&self, challenge_id: &str) -> Result<ChallengeSummary, Error> {
        self.transact(challenge_id, |record, now| Ok(record.summary(now)))
            .await
    }

    pub async fn list_challenges(&self) -> Result<Vec<ChallengeSummary>, Error> {
        let now = self.clock.now();
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(|record| record.summary(now))
            .collect())
    }

    /// Always recomputed from the current roster, the cache is refreshed as a side effect
    pub async fn get_leaderboard(&self, challenge_id: &str) -> Result<Vec<LeaderboardEntry>, Error> {
        self.transact(challenge_id, |record, _| {
            self.refresh_standings(record);
            Ok(record.leaderboard.clone())
        })
        .await
    }

    pub async fn get_team_leaderboard(
        &self,
        challenge_id: &str,
    ) -> Result<Vec<TeamStanding>, Error> {
        self.transact(challenge_id, |record, _| {
            if record.challenge.challenge_type != ChallengeType::Team {
                return Err(Error::TeamNotAllowed(format!(
                    "challenge {} is not a team challenge",
                    record.id()
                )));
            }
            self.refresh_standings(record);
            Ok(record.team_standings.clone())
        })
        .await
    }

    pub async fn get_user_challenges(&self, user_id: &str) -> Result<Vec<ChallengeSummary>, Error> {
        let now = self.clock.now();
        Ok(self
            .store
            .for_user(user_id)
            .await?
            .iter()
            .map(|record| record.summary(now))
            .collect())
    }

    /// Finalizes the user's ended challenges first so rank rewards are never missing
    pub async fn get_achievements(&self, user_id: &str) -> Result<Vec<Achievement>, Error> {
        let now = self.clock.now();
        for record in self.store.for_user(user_id).await? {
            if record.needs_finalization(now) {
                self.finalize_challenge(record.id()).await?;
            }
        }
        self.store.achievements_for_user(user_id).await
    }

    /// Returns whether this call performed the finalization
    pub async fn finalize_challenge(&self, challenge_id: &str) -> Result<bool, Error> {
        let _guard = self.store.lock(challenge_id).await;
        let now = self.clock.now();
        let mut record = self.store.load(challenge_id).await?;
        if !record.needs_finalization(now) {
            return Ok(false);
        }
        self.finalize(&mut record, now);
        self.store.save(&record).await?;
        Ok(true)
    }

    /// Finalize every challenge past its end date, returning the ids finalized
    pub async fn finalize_ended_challenges(&self) -> Result<Vec<String>, Error> {
        let pending = self.store.pending_finalization(self.clock.now()).await?;
        let mut finalized = vec![];
        for challenge_id in pending {
            match self.finalize_challenge(&challenge_id).await {
                Ok(true) => finalized.push(challenge_id),
                Ok(false) => {}
                Err(e) => error!("failed to finalize challenge {}: {}", challenge_id, e),
            }
        }
        Ok(finalized)
    }
}
