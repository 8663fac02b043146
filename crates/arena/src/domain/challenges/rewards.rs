use arena_core::{Achievement, RewardCondition};
use log::info;
use time::OffsetDateTime;

use super::ChallengeRecord;

impl ChallengeRecord {
    /// Grant every reward carrying `condition` to the user, skipping those
    /// already earned. Returns only the achievements created by this call.
    pub fn award_for_condition(
        &mut self,
        user_id: &str,
        condition: RewardCondition,
        now: OffsetDateTime,
    ) -> Vec<Achievement> {
        let granted: Vec<Achievement> = self
            .challenge
            .rewards_for(condition)
            .filter(|reward| !self.has_achievement(user_id, &reward.id))
            .map(|reward| Achievement::new(user_id, &self.challenge.id, reward, now))
            .collect();

        for achievement in &granted {
            info!(
                "user {} earned reward {} ({:?}) in challenge {}",
                achievement.user_id, achievement.reward_id, achievement.condition, self.challenge.id
            );
        }
        self.achievements.extend(granted.iter().cloned());
        granted
    }

    /// Grant whatever the user currently qualifies for.
    ///
    /// Participation and completion follow the live roster. Rank rewards only
    /// apply once final standings exist, so they are never issued from an
    /// interim leaderboard.
    pub fn award_if_eligible(&mut self, user_id: &str, now: OffsetDateTime) -> Vec<Achievement> {
        let Some(participant) = self.participants.get(user_id) else {
            return vec![];
        };
        let completed = participant.completed;

        let mut granted = self.award_for_condition(user_id, RewardCondition::Participation, now);
        if completed {
            granted.extend(self.award_for_condition(user_id, RewardCondition::Completion, now));
        }
        if self.finalized_at.is_some() {
            granted.extend(self.award_rank_rewards_for(user_id, now));
        }
        granted
    }

    /// Issue top_3 and top_10 rewards from the cached final leaderboard
    pub fn award_rank_rewards(&mut self, now: OffsetDateTime) -> Vec<Achievement> {
        let user_ids: Vec<String> = self
            .leaderboard
            .iter()
            .map(|entry| entry.user_id.clone())
            .collect();

        user_ids
            .iter()
            .flat_map(|user_id| self.award_rank_rewards_for(user_id, now))
            .collect()
    }

    fn award_rank_rewards_for(&mut self, user_id: &str, now: OffsetDateTime) -> Vec<Achievement> {
        let Some(rank) = self
            .leaderboard
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map(|entry| entry.rank)
        else {
            return vec![];
        };

        let mut granted = vec![];
        for condition in [RewardCondition::Top3, RewardCondition::Top10] {
            if condition
                .rank_threshold()
                .is_some_and(|threshold| rank <= threshold)
            {
                granted.extend(self.award_for_condition(user_id, condition, now));
            }
        }
        granted
    }
}
