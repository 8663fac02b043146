use arena_core::Achievement;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::domain::{sort_achievements, ChallengeRecord, ChallengeRepository, Error};

/// Process-local repository for tests and ephemeral runs.
///
/// Mirrors the SQLite store's contract: saves replace the whole record and
/// achievements, once stored, survive later saves.
#[derive(Debug, Default)]
pub struct MemoryChallengeRepository {
    records: RwLock<HashMap<String, ChallengeRecord>>,
}

impl MemoryChallengeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChallengeRepository for MemoryChallengeRepository {
    async fn ping(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn insert_challenge(&self, record: &ChallengeRecord) -> Result<bool, Error> {
        let mut records = self.records.write().await;
        if records.contains_key(record.id()) {
            return Ok(false);
        }
        records.insert(record.id().to_string(), record.clone());
        Ok(true)
    }

    async fn get_record(&self, challenge_id: &str) -> Result<Option<ChallengeRecord>, Error> {
        Ok(self.records.read().await.get(challenge_id).cloned())
    }

    async fn save_record(&self, record: &ChallengeRecord) -> Result<(), Error> {
        let mut records = self.records.write().await;
        let mut next = record.clone();
        if let Some(previous) = records.get(record.id()) {
            let kept: HashSet<(&str, &str)> = next
                .achievements
                .iter()
                .map(|a| (a.user_id.as_str(), a.reward_id.as_str()))
                .collect();
            let missing: Vec<Achievement> = previous
                .achievements
                .iter()
                .filter(|a| !kept.contains(&(a.user_id.as_str(), a.reward_id.as_str())))
                .cloned()
                .collect();
            next.achievements.extend(missing);
        }
        sort_achievements(&mut next.achievements);
        records.insert(record.id().to_string(), next);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ChallengeRecord>, Error> {
        let mut records: Vec<ChallengeRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(records)
    }

    async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<ChallengeRecord>, Error> {
        let mut records: Vec<ChallengeRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.participants.contains_key(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(records)
    }

    async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>, Error> {
        let mut achievements: Vec<Achievement> = self
            .records
            .read()
            .await
            .values()
            .flat_map(|record| record.achievements.iter())
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        sort_achievements(&mut achievements);
        Ok(achievements)
    }

    async fn pending_finalization(&self, now: OffsetDateTime) -> Result<Vec<String>, Error> {
        let mut pending: Vec<String> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.needs_finalization(now))
            .map(|record| record.id().to_string())
            .collect();
        pending.sort();
        Ok(pending)
    }
}
