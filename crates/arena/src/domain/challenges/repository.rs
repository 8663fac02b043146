use arena_core::{Achievement, Participant};
use async_trait::async_trait;
use log::debug;
use sqlx::{sqlite::SqliteRow, Row};
use std::collections::BTreeMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::ChallengeRecord;
use crate::{
    domain::Error,
    infra::db::{
        parse_optional_datetime, parse_required_blob_json, parse_required_datetime, DBConnection,
    },
};

/// Key-addressable persistence for challenge records.
///
/// `save_record` must replace the stored record as one atomic unit.
/// Achievements are append-only: saving never removes one that was stored.
#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    async fn ping(&self) -> Result<(), Error>;

    /// Returns false when a challenge with the same id already exists
    async fn insert_challenge(&self, record: &ChallengeRecord) -> Result<bool, Error>;

    async fn get_record(&self, challenge_id: &str) -> Result<Option<ChallengeRecord>, Error>;

    async fn save_record(&self, record: &ChallengeRecord) -> Result<(), Error>;

    async fn list_records(&self) -> Result<Vec<ChallengeRecord>, Error>;

    /// Challenges the user is currently enrolled in
    async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<ChallengeRecord>, Error>;

    async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>, Error>;

    /// Ids of challenges past their end date that have not been finalized or cancelled
    async fn pending_finalization(&self, now: OffsetDateTime) -> Result<Vec<String>, Error>;
}

/// Orders achievements by when they were earned, then by key
pub fn sort_achievements(achievements: &mut [Achievement]) {
    achievements.sort_by(|a, b| {
        a.earned_at
            .cmp(&b.earned_at)
            .then_with(|| a.challenge_id.cmp(&b.challenge_id))
            .then_with(|| a.reward_id.cmp(&b.reward_id))
    });
}

#[derive(Debug, Clone)]
pub struct SqliteChallengeRepository {
    db_connection: DBConnection,
}

impl SqliteChallengeRepository {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    async fn load_participants(
        &self,
        challenge_id: &str,
    ) -> Result<BTreeMap<String, Participant>, Error> {
        let rows = sqlx::query(
            "SELECT user_id, joined_at, team, progress, completed, completed_at
             FROM participants
             WHERE challenge_id = ?",
        )
        .bind(challenge_id)
        .fetch_all(self.db_connection.read())
        .await?;

        let mut participants = BTreeMap::new();
        for row in rows {
            let participant = participant_from_row(&row)?;
            participants.insert(participant.user_id.clone(), participant);
        }
        Ok(participants)
    }

    async fn load_achievements(&self, challenge_id: &str) -> Result<Vec<Achievement>, Error> {
        let rows = sqlx::query("SELECT achievement FROM achievements WHERE challenge_id = ?")
            .bind(challenge_id)
            .fetch_all(self.db_connection.read())
            .await?;

        let mut achievements = rows
            .iter()
            .map(|row| parse_required_blob_json(row, "achievement"))
            .collect::<Result<Vec<Achievement>, sqlx::Error>>()?;
        sort_achievements(&mut achievements);
        Ok(achievements)
    }

    async fn load_records(&self, challenge_ids: Vec<String>) -> Result<Vec<ChallengeRecord>, Error> {
        let mut records = Vec::with_capacity(challenge_ids.len());
        for challenge_id in challenge_ids {
            if let Some(record) = self.get_record(&challenge_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn participant_from_row(row: &SqliteRow) -> Result<Participant, sqlx::Error> {
    Ok(Participant {
        user_id: row.try_get("user_id")?,
        joined_at: parse_required_datetime(row, "joined_at")?,
        progress: parse_required_blob_json(row, "progress")?,
        completed: row.try_get::<bool, _>("completed")?,
        completed_at: parse_optional_datetime(row, "completed_at")?,
        team: row.try_get("team")?,
    })
}

fn format_datetime(value: OffsetDateTime) -> Result<String, sqlx::Error> {
    value
        .format(&Rfc3339)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn format_optional_datetime(value: Option<OffsetDateTime>) -> Result<Option<String>, sqlx::Error> {
    value.map(format_datetime).transpose()
}

#[async_trait]
impl ChallengeRepository for SqliteChallengeRepository {
    async fn ping(&self) -> Result<(), Error> {
        self.db_connection.ping().await.map_err(Error::from)
    }

    async fn insert_challenge(&self, record: &ChallengeRecord) -> Result<bool, Error> {
        let inserted = sqlx::query(
            "INSERT INTO challenges (
                id,
                challenge,
                teams,
                departed,
                leaderboard,
                team_standings,
                end_ts,
                cancelled_at,
                finalized_at,
                created_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING",
        )
        .bind(record.id())
        .bind(serde_json::to_vec(&record.challenge)?)
        .bind(serde_json::to_vec(&record.teams)?)
        .bind(serde_json::to_vec(&record.departed)?)
        .bind(serde_json::to_vec(&record.leaderboard)?)
        .bind(serde_json::to_vec(&record.team_standings)?)
        .bind(record.challenge.end_date.unix_timestamp())
        .bind(format_optional_datetime(record.challenge.cancelled_at)?)
        .bind(format_optional_datetime(record.finalized_at)?)
        .bind(format_datetime(record.challenge.created_at)?)
        .bind(format_datetime(record.challenge.created_at)?)
        .execute(self.db_connection.write())
        .await?;

        Ok(inserted.rows_affected() > 0)
    }

    async fn get_record(&self, challenge_id: &str) -> Result<Option<ChallengeRecord>, Error> {
        let Some(row) = sqlx::query(
            "SELECT challenge, teams, departed, leaderboard, team_standings, finalized_at
             FROM challenges
             WHERE id = ?",
        )
        .bind(challenge_id)
        .fetch_optional(self.db_connection.read())
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(ChallengeRecord {
            challenge: parse_required_blob_json(&row, "challenge")?,
            participants: self.load_participants(challenge_id).await?,
            departed: parse_required_blob_json(&row, "departed")?,
            teams: parse_required_blob_json(&row, "teams")?,
            achievements: self.load_achievements(challenge_id).await?,
            leaderboard: parse_required_blob_json(&row, "leaderboard")?,
            team_standings: parse_required_blob_json(&row, "team_standings")?,
            finalized_at: parse_optional_datetime(&row, "finalized_at")?,
        }))
    }

    async fn save_record(&self, record: &ChallengeRecord) -> Result<(), Error> {
        let now = format_datetime(OffsetDateTime::now_utc())?;
        let mut tx = self.db_connection.write().begin().await?;

        sqlx::query(
            "UPDATE challenges
             SET challenge = ?,
                 teams = ?,
                 departed = ?,
                 leaderboard = ?,
                 team_standings = ?,
                 end_ts = ?,
                 cancelled_at = ?,
                 finalized_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(serde_json::to_vec(&record.challenge)?)
        .bind(serde_json::to_vec(&record.teams)?)
        .bind(serde_json::to_vec(&record.departed)?)
        .bind(serde_json::to_vec(&record.leaderboard)?)
        .bind(serde_json::to_vec(&record.team_standings)?)
        .bind(record.challenge.end_date.unix_timestamp())
        .bind(format_optional_datetime(record.challenge.cancelled_at)?)
        .bind(format_optional_datetime(record.finalized_at)?)
        .bind(&now)
        .bind(record.id())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM participants WHERE challenge_id = ?")
            .bind(record.id())
            .execute(&mut *tx)
            .await?;

        for participant in record.participants.values() {
            sqlx::query(
                "INSERT INTO participants (
                    challenge_id,
                    user_id,
                    joined_at,
                    team,
                    progress,
                    completed,
                    completed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.id())
            .bind(&participant.user_id)
            .bind(format_datetime(participant.joined_at)?)
            .bind(&participant.team)
            .bind(serde_json::to_vec(&participant.progress)?)
            .bind(participant.completed)
            .bind(format_optional_datetime(participant.completed_at)?)
            .execute(&mut *tx)
            .await?;
        }

        for achievement in &record.achievements {
            sqlx::query(
                "INSERT OR IGNORE INTO achievements (
                    user_id,
                    challenge_id,
                    reward_id,
                    achievement,
                    earned_at
                ) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&achievement.user_id)
            .bind(&achievement.challenge_id)
            .bind(&achievement.reward_id)
            .bind(serde_json::to_vec(achievement)?)
            .bind(format_datetime(achievement.earned_at)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("committed challenge {}", record.id());
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ChallengeRecord>, Error> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM challenges ORDER BY id")
            .fetch_all(self.db_connection.read())
            .await?;
        self.load_records(ids).await
    }

    async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<ChallengeRecord>, Error> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT challenge_id FROM participants WHERE user_id = ? ORDER BY challenge_id",
        )
        .bind(user_id)
        .fetch_all(self.db_connection.read())
        .await?;
        self.load_records(ids).await
    }

    async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>, Error> {
        let rows = sqlx::query("SELECT achievement FROM achievements WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(self.db_connection.read())
            .await?;

        let mut achievements = rows
            .iter()
            .map(|row| parse_required_blob_json(row, "achievement"))
            .collect::<Result<Vec<Achievement>, sqlx::Error>>()?;
        sort_achievements(&mut achievements);
        Ok(achievements)
    }

    async fn pending_finalization(&self, now: OffsetDateTime) -> Result<Vec<String>, Error> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM challenges
             WHERE finalized_at IS NULL
               AND cancelled_at IS NULL
               AND end_ts < ?
             ORDER BY end_ts, id",
        )
        .bind(now.unix_timestamp())
        .fetch_all(self.db_connection.read())
        .await?;
        Ok(ids)
    }
}
