//! Challenge data model shared by the engine and its API consumers

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    Individual,
    Team,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

/// Lifecycle status of a challenge.
///
/// Never stored: always derived from the challenge dates and the explicit
/// cancellation timestamp via [`Challenge::status_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Upcoming,
    Active,
    Completed,
    Cancelled,
}

impl ChallengeStatus {
    /// Completed and cancelled challenges accept no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a participant's progress is turned into a leaderboard score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressMetric {
    /// Sum of raw progress across requirements
    #[default]
    Total,
    /// Mean of capped per-requirement completion percentage
    Average,
    /// Same computation as `Average`
    CompletionRate,
}

/// A single quantitative target, e.g. 100 reps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    /// Kind of activity counted, e.g. reps, calories, steps, distance
    #[serde(rename = "type")]
    pub requirement_type: String,
    pub target: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Badge,
    Points,
    Title,
    StreakMultiplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RewardCondition {
    #[serde(rename = "completion")]
    Completion,
    #[serde(rename = "top_3")]
    Top3,
    #[serde(rename = "top_10")]
    Top10,
    #[serde(rename = "participation")]
    Participation,
}

impl RewardCondition {
    /// Highest final rank that still qualifies, for rank based conditions
    pub fn rank_threshold(&self) -> Option<usize> {
        match self {
            Self::Top3 => Some(3),
            Self::Top10 => Some(10),
            Self::Completion | Self::Participation => None,
        }
    }
}

/// Badge names and titles are labels, points and multipliers are amounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RewardValue {
    Amount(f64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    #[serde(rename = "type")]
    pub reward_type: RewardType,
    pub value: RewardValue,
    pub condition: RewardCondition,
}

/// Authoring payload for a new challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChallenge {
    /// Generated when omitted
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Derived from the dates when omitted
    #[serde(default)]
    pub duration_days: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub progress_metric: ProgressMetric,
    #[serde(default)]
    pub max_participants: Option<usize>,
}

fn default_category() -> String {
    String::from("general")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub category: String,
    pub difficulty: Difficulty,
    pub duration_days: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub requirements: Vec<Requirement>,
    pub rewards: Vec<Reward>,
    pub progress_metric: ProgressMetric,
    pub max_participants: Option<usize>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Explicit operator cancellation, the only stored input to status
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
}

impl Challenge {
    pub fn new(id: String, create: CreateChallenge, created_at: OffsetDateTime) -> Self {
        let duration_days = create
            .duration_days
            .unwrap_or_else(|| (create.end_date - create.start_date).whole_days().max(1) as u32);

        Self {
            id,
            title: create.title,
            description: create.description,
            challenge_type: create.challenge_type,
            category: create.category,
            difficulty: create.difficulty,
            duration_days,
            start_date: create.start_date,
            end_date: create.end_date,
            requirements: create.requirements,
            rewards: create.rewards,
            progress_metric: create.progress_metric,
            max_participants: create.max_participants,
            created_at,
            cancelled_at: None,
        }
    }

    /// upcoming -> active (now >= start) -> completed (now > end), with
    /// cancellation overriding everything once set.
    pub fn status_at(&self, now: OffsetDateTime) -> ChallengeStatus {
        if self.cancelled_at.is_some() {
            ChallengeStatus::Cancelled
        } else if now < self.start_date {
            ChallengeStatus::Upcoming
        } else if now > self.end_date {
            ChallengeStatus::Completed
        } else {
            ChallengeStatus::Active
        }
    }

    pub fn requirement(&self, requirement_id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == requirement_id)
    }

    pub fn rewards_for(&self, condition: RewardCondition) -> impl Iterator<Item = &Reward> {
        self.rewards
            .iter()
            .filter(move |reward| reward.condition == condition)
    }

    /// Whether `at` falls inside the challenge window
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        at >= self.start_date && at <= self.end_date
    }
}

/// A user's enrollment and progress within one challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    /// requirement id -> accumulated value, never decreases
    pub progress: BTreeMap<String, f64>,
    /// One-way: set once every requirement is met
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    pub team: Option<String>,
}

impl Participant {
    pub fn new(user_id: String, team: Option<String>, joined_at: OffsetDateTime) -> Self {
        Self {
            user_id,
            joined_at,
            progress: BTreeMap::new(),
            completed: false,
            completed_at: None,
            team,
        }
    }

    pub fn progress_for(&self, requirement_id: &str) -> f64 {
        self.progress.get(requirement_id).copied().unwrap_or(0.0)
    }

    /// Conjunction over every requirement, an empty list never qualifies
    pub fn meets_all(&self, requirements: &[Requirement]) -> bool {
        !requirements.is_empty()
            && requirements
                .iter()
                .all(|r| self.progress_for(&r.id) >= r.target)
    }
}

/// Historical record kept when a participant leaves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartedParticipant {
    pub participant: Participant,
    #[serde(with = "time::serde::rfc3339")]
    pub left_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub members: BTreeSet<String>,
    /// Derived by the team aggregation pass, never set directly
    pub total_score: f64,
    /// Derived by the team aggregation pass, never set directly
    pub average_score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Team {
    pub fn new(id: String, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            members: BTreeSet::new(),
            total_score: 0.0,
            average_score: 0.0,
            created_at,
        }
    }
}

/// Record that a reward was granted, unique per (user, challenge, reward)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub user_id: String,
    pub challenge_id: String,
    pub reward_id: String,
    pub reward_type: RewardType,
    pub value: RewardValue,
    pub condition: RewardCondition,
    #[serde(with = "time::serde::rfc3339")]
    pub earned_at: OffsetDateTime,
}

impl Achievement {
    pub fn new(
        user_id: &str,
        challenge_id: &str,
        reward: &Reward,
        earned_at: OffsetDateTime,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            reward_id: reward.id.clone(),
            reward_type: reward.reward_type,
            value: reward.value.clone(),
            condition: reward.condition,
            earned_at,
        }
    }

    pub fn matches(&self, user_id: &str, challenge_id: &str, reward_id: &str) -> bool {
        self.user_id == user_id && self.challenge_id == challenge_id && self.reward_id == reward_id
    }
}

/// Derived standing of a participant, cached but never a source of truth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub score: f64,
    pub progress_percent: f64,
    pub rank: usize,
    pub team: Option<String>,
}

/// Derived standing of a team within a team challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStanding {
    pub team_id: String,
    pub member_count: usize,
    pub total_score: f64,
    pub average_score: f64,
    pub rank: usize,
}

/// Raw progress emitted by workout, nutrition and step collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: String,
    pub metric_type: String,
    pub value: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
