use arena::{
    ChallengeEngine, ChallengeRecord, ChallengeRepository, ChallengeStore, EngineError as Error,
    LeaderboardRanker, ManualClock, MemoryChallengeRepository, MetricMappings,
};
use arena_core::{
    Achievement, ChallengeType, CreateChallenge, Difficulty, ProgressMetric, Requirement, Reward,
    RewardCondition, RewardType, RewardValue,
};
use async_trait::async_trait;
use mockall::mock;
use std::sync::{Arc, Once};
use time::{macros::datetime, OffsetDateTime};

mock! {
    pub Repository { }

    #[async_trait]
    impl ChallengeRepository for Repository {
        async fn ping(&self) -> Result<(), Error>;
        async fn insert_challenge(&self, record: &ChallengeRecord) -> Result<bool, Error>;
        async fn get_record(&self, challenge_id: &str) -> Result<Option<ChallengeRecord>, Error>;
        async fn save_record(&self, record: &ChallengeRecord) -> Result<(), Error>;
        async fn list_records(&self) -> Result<Vec<ChallengeRecord>, Error>;
        async fn challenges_for_user(&self, user_id: &str) -> Result<Vec<ChallengeRecord>, Error>;
        async fn achievements_for_user(&self, user_id: &str) -> Result<Vec<Achievement>, Error>;
        async fn pending_finalization(&self, now: OffsetDateTime) -> Result<Vec<String>, Error>;
    }
}

static INIT_LOGGER: Once = Once::new();

pub fn setup_static_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub const START: OffsetDateTime = datetime!(2026-05-01 00:00 UTC);
pub const END: OffsetDateTime = datetime!(2026-05-31 00:00 UTC);
pub const DURING: OffsetDateTime = datetime!(2026-05-10 12:00 UTC);

pub fn requirement(id: &str, requirement_type: &str, target: f64) -> Requirement {
    Requirement {
        id: id.to_string(),
        requirement_type: requirement_type.to_string(),
        target,
        unit: String::from("count"),
    }
}

pub fn reward(id: &str, condition: RewardCondition) -> Reward {
    Reward {
        id: id.to_string(),
        reward_type: RewardType::Badge,
        value: RewardValue::Label(id.to_string()),
        condition,
    }
}

pub fn challenge(
    id: &str,
    challenge_type: ChallengeType,
    requirements: Vec<Requirement>,
) -> CreateChallenge {
    CreateChallenge {
        id: Some(id.to_string()),
        title: format!("{} challenge", id),
        description: String::from("May fitness push"),
        challenge_type,
        category: String::from("fitness"),
        difficulty: Difficulty::Intermediate,
        duration_days: None,
        start_date: START,
        end_date: END,
        requirements,
        rewards: vec![
            reward("joined", RewardCondition::Participation),
            reward("finished", RewardCondition::Completion),
            reward("podium", RewardCondition::Top3),
            reward("top-ten", RewardCondition::Top10),
        ],
        progress_metric: ProgressMetric::Total,
        max_participants: None,
    }
}

pub fn engine_with(
    repository: Arc<dyn ChallengeRepository>,
    clock: &ManualClock,
) -> ChallengeEngine {
    ChallengeEngine::new(
        Arc::new(ChallengeStore::new(repository)),
        LeaderboardRanker::new(3),
        Arc::new(clock.clone()),
        MetricMappings::default(),
    )
}

pub fn test_engine() -> (Arc<ChallengeEngine>, ManualClock) {
    setup_static_logger();
    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(MemoryChallengeRepository::new()), &clock);
    (Arc::new(engine), clock)
}
