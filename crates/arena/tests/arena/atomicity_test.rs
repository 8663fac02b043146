use arena::{
    ChallengeRecord, ChallengeRepository, EngineError as Error, ManualClock,
    MemoryChallengeRepository,
};
use arena_core::{ActivityEvent, ChallengeType};
use std::{collections::HashMap, sync::Arc};

use crate::helpers::{
    challenge, engine_with, requirement, setup_static_logger, MockRepository, DURING,
};

/// Build a challenge with `users` joined through a real engine and return the stored record
async fn stored_record(challenge_id: &str, users: &[&str]) -> ChallengeRecord {
    let clock = ManualClock::new(DURING);
    let repository = Arc::new(MemoryChallengeRepository::new());
    let engine = engine_with(repository.clone(), &clock);
    engine
        .create_challenge(challenge(
            challenge_id,
            ChallengeType::Individual,
            vec![requirement("steps", "steps", 10000.0)],
        ))
        .await
        .unwrap();
    for user_id in users {
        engine.join(challenge_id, user_id, None).await.unwrap();
    }
    repository.get_record(challenge_id).await.unwrap().unwrap()
}

fn write_failure() -> Error {
    Error::DbError(sqlx::Error::PoolTimedOut)
}

#[tokio::test]
async fn test_failed_save_discards_progress() {
    setup_static_logger();
    let record = stored_record("walks", &["ana"]).await;

    let mut repository = MockRepository::new();
    repository
        .expect_get_record()
        .returning(move |_| Ok(Some(record.clone())));
    repository
        .expect_save_record()
        .times(1)
        .returning(|_| Err(write_failure()));

    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(repository), &clock);

    let result = engine.update_progress("walks", "ana", "steps", 500.0).await;
    assert!(matches!(result, Err(Error::DbError(_))));

    let board = engine.get_leaderboard("walks").await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].score, 0.0);
}

#[tokio::test]
async fn test_failed_save_discards_join() {
    setup_static_logger();
    let record = stored_record("walks", &[]).await;

    let mut repository = MockRepository::new();
    repository
        .expect_get_record()
        .returning(move |_| Ok(Some(record.clone())));
    repository
        .expect_save_record()
        .times(1)
        .returning(|_| Err(write_failure()));

    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(repository), &clock);

    assert!(matches!(
        engine.join("walks", "ana", None).await,
        Err(Error::DbError(_))
    ));
    assert!(engine.get_leaderboard("walks").await.unwrap().is_empty());
    assert_eq!(engine.get_challenge("walks").await.unwrap().participant_count, 0);
}

#[tokio::test]
async fn test_rejected_operation_never_writes() {
    setup_static_logger();
    let record = stored_record("walks", &["ana"]).await;

    let mut repository = MockRepository::new();
    repository
        .expect_get_record()
        .returning(move |_| Ok(Some(record.clone())));
    repository.expect_save_record().never();

    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(repository), &clock);

    assert!(matches!(
        engine.update_progress("walks", "ana", "laps", 5.0).await,
        Err(Error::UnknownRequirement { .. })
    ));
    assert!(matches!(
        engine.update_progress("walks", "ben", "steps", 5.0).await,
        Err(Error::UnknownParticipant { .. })
    ));
    assert!(matches!(
        engine.join("walks", "ana", None).await,
        Err(Error::DuplicateParticipant { .. })
    ));
}

#[tokio::test]
async fn test_existing_id_is_not_overwritten() {
    setup_static_logger();
    let mut repository = MockRepository::new();
    repository
        .expect_insert_challenge()
        .times(1)
        .returning(|_| Ok(false));

    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(repository), &clock);

    let result = engine
        .create_challenge(challenge(
            "walks",
            ChallengeType::Individual,
            vec![requirement("steps", "steps", 10000.0)],
        ))
        .await;
    assert!(matches!(result, Err(Error::InvalidChallenge(_))));
}

#[tokio::test]
async fn test_activity_failure_in_one_challenge_spares_the_others() {
    setup_static_logger();
    let records: HashMap<String, ChallengeRecord> = HashMap::from([
        (String::from("broken"), stored_record("broken", &["ana"]).await),
        (String::from("walks"), stored_record("walks", &["ana"]).await),
    ]);
    let listed: Vec<ChallengeRecord> = records.values().cloned().collect();

    let mut repository = MockRepository::new();
    repository
        .expect_challenges_for_user()
        .returning(move |_| Ok(listed.clone()));
    repository
        .expect_get_record()
        .returning(move |challenge_id| Ok(records.get(challenge_id).cloned()));
    repository.expect_save_record().times(2).returning(|record| {
        if record.id() == "broken" {
            Err(write_failure())
        } else {
            Ok(())
        }
    });

    let clock = ManualClock::new(DURING);
    let engine = engine_with(Arc::new(repository), &clock);

    let applied = engine
        .handle_activity_event(&ActivityEvent {
            user_id: String::from("ana"),
            metric_type: String::from("steps"),
            value: 1200.0,
            timestamp: DURING,
        })
        .await
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].challenge_id, "walks");
    assert_eq!(applied[0].progress, 1200.0);
}
