use arena::EngineError as Error;
use arena_core::{ActivityEvent, ChallengeStatus, ChallengeType, RewardCondition};
use time::Duration;

use crate::helpers::{challenge, requirement, test_engine, DURING, END, START};

#[tokio::test]
async fn test_progress_completes_challenge_and_rewards_once() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "pushups",
            ChallengeType::Individual,
            vec![requirement("reps", "reps", 100.0)],
        ))
        .await
        .unwrap();
    engine.join("pushups", "ana", None).await.unwrap();

    let first = engine
        .update_progress("pushups", "ana", "reps", 45.0)
        .await
        .unwrap();
    assert_eq!(first.update.progress, 45.0);
    assert!(!first.update.completed);
    assert!(first.achievements.is_empty());

    let second = engine
        .update_progress("pushups", "ana", "reps", 55.0)
        .await
        .unwrap();
    assert_eq!(second.update.progress, 100.0);
    assert!(second.update.completed);
    assert!(second.update.newly_completed);
    assert_eq!(second.achievements.len(), 1);
    assert_eq!(second.achievements[0].reward_id, "finished");

    assert!(engine
        .award_if_eligible("pushups", "ana")
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .award_if_eligible("pushups", "ana")
        .await
        .unwrap()
        .is_empty());

    let achievements = engine.get_achievements("ana").await.unwrap();
    let completions = achievements
        .iter()
        .filter(|a| a.condition == RewardCondition::Completion)
        .count();
    assert_eq!(completions, 1);
    assert_eq!(achievements.len(), 2);
}

#[tokio::test]
async fn test_tie_goes_to_earlier_joiner() {
    let (engine, clock) = test_engine();
    engine
        .create_challenge(challenge(
            "burpees",
            ChallengeType::Individual,
            vec![requirement("reps", "reps", 100.0)],
        ))
        .await
        .unwrap();

    engine.join("burpees", "zoe", None).await.unwrap();
    clock.advance(Duration::hours(1));
    engine.join("burpees", "ana", None).await.unwrap();

    engine
        .update_progress("burpees", "ana", "reps", 80.0)
        .await
        .unwrap();
    engine
        .update_progress("burpees", "zoe", "reps", 80.0)
        .await
        .unwrap();

    let board = engine.get_leaderboard("burpees").await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].user_id, "zoe");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[1].user_id, "ana");
    assert_eq!(board[1].rank, 2);
    assert_eq!(board[0].score, board[1].score);
}

#[tokio::test]
async fn test_full_challenge_rejects_join() {
    let (engine, _clock) = test_engine();
    let mut create = challenge(
        "squats",
        ChallengeType::Individual,
        vec![requirement("reps", "reps", 50.0)],
    );
    create.max_participants = Some(2);
    engine.create_challenge(create).await.unwrap();

    engine.join("squats", "ana", None).await.unwrap();
    engine.join("squats", "ben", None).await.unwrap();
    let result = engine.join("squats", "cai", None).await;
    assert!(matches!(
        result,
        Err(Error::CapacityExceeded {
            max_participants: 2,
            ..
        })
    ));

    let summary = engine.get_challenge("squats").await.unwrap();
    assert_eq!(summary.participant_count, 2);
}

#[tokio::test]
async fn test_progress_after_end_is_rejected() {
    let (engine, clock) = test_engine();
    engine
        .create_challenge(challenge(
            "lunges",
            ChallengeType::Individual,
            vec![requirement("reps", "reps", 50.0)],
        ))
        .await
        .unwrap();
    engine.join("lunges", "ana", None).await.unwrap();

    clock.set(END + Duration::days(1));
    let result = engine.update_progress("lunges", "ana", "reps", 10.0).await;
    assert!(matches!(
        result,
        Err(Error::ChallengeClosed {
            status: ChallengeStatus::Completed,
            ..
        })
    ));

    let summary = engine.get_challenge("lunges").await.unwrap();
    assert_eq!(summary.status, ChallengeStatus::Completed);
    assert!(summary.finalized_at.is_some());
}

#[tokio::test]
async fn test_ranks_are_a_permutation_across_batches() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "rowing",
            ChallengeType::Global,
            vec![requirement("meters", "distance", 5000.0)],
        ))
        .await
        .unwrap();

    let deltas = [12.0, 80.0, 80.0, 3.0, 55.0, 0.0, 99.0];
    for (index, delta) in deltas.iter().enumerate() {
        let user_id = format!("u{}", index);
        engine.join("rowing", &user_id, None).await.unwrap();
        engine
            .update_progress("rowing", &user_id, "meters", *delta)
            .await
            .unwrap();
    }

    let board = engine.get_leaderboard("rowing").await.unwrap();
    let ranks: Vec<usize> = board.iter().map(|entry| entry.rank).collect();
    assert_eq!(ranks, (1..=deltas.len()).collect::<Vec<_>>());

    let order: Vec<&str> = board.iter().map(|entry| entry.user_id.as_str()).collect();
    assert_eq!(order, vec!["u6", "u1", "u2", "u4", "u0", "u3", "u5"]);

    assert_eq!(engine.get_leaderboard("rowing").await.unwrap(), board);
}

#[tokio::test]
async fn test_progress_never_decreases_and_completion_sticks() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "planks",
            ChallengeType::Individual,
            vec![requirement("minutes", "minutes", 10.0)],
        ))
        .await
        .unwrap();
    engine.join("planks", "ana", None).await.unwrap();

    engine
        .update_progress("planks", "ana", "minutes", 12.0)
        .await
        .unwrap();

    for delta in [-1.0, f64::NAN, f64::INFINITY] {
        let result = engine.update_progress("planks", "ana", "minutes", delta).await;
        assert!(matches!(result, Err(Error::InvalidProgressDelta(_))));
    }

    let later = engine
        .update_progress("planks", "ana", "minutes", 0.0)
        .await
        .unwrap();
    assert_eq!(later.update.progress, 12.0);
    assert!(later.update.completed);
    assert!(!later.update.newly_completed);
    assert!(later.achievements.is_empty());
}

#[tokio::test]
async fn test_rank_rewards_issued_once_at_finalization() {
    let (engine, clock) = test_engine();
    engine
        .create_challenge(challenge(
            "cycling",
            ChallengeType::Individual,
            vec![requirement("km", "distance", 100.0)],
        ))
        .await
        .unwrap();
    engine.join("cycling", "ana", None).await.unwrap();
    engine
        .update_progress("cycling", "ana", "km", 40.0)
        .await
        .unwrap();

    assert!(engine
        .get_achievements("ana")
        .await
        .unwrap()
        .iter()
        .all(|a| a.condition.rank_threshold().is_none()));

    clock.set(END + Duration::hours(1));
    assert_eq!(
        engine.finalize_ended_challenges().await.unwrap(),
        vec![String::from("cycling")]
    );
    assert!(engine.finalize_ended_challenges().await.unwrap().is_empty());
    assert!(engine
        .award_if_eligible("cycling", "ana")
        .await
        .unwrap()
        .is_empty());

    let achievements = engine.get_achievements("ana").await.unwrap();
    let mut reward_ids: Vec<&str> = achievements
        .iter()
        .map(|a| a.reward_id.as_str())
        .collect();
    reward_ids.sort();
    assert_eq!(reward_ids, vec!["joined", "podium", "top-ten"]);
}

#[tokio::test]
async fn test_team_totals_follow_member_scores() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "relay",
            ChallengeType::Team,
            vec![
                requirement("reps", "reps", 100.0),
                requirement("steps", "steps", 1000.0),
            ],
        ))
        .await
        .unwrap();
    engine.create_team("relay", "red").await.unwrap();
    engine.create_team("relay", "blue").await.unwrap();

    engine.join("relay", "ana", Some("red")).await.unwrap();
    engine.join("relay", "ben", Some("red")).await.unwrap();
    engine.join("relay", "cai", Some("blue")).await.unwrap();

    engine
        .update_progress("relay", "ana", "reps", 30.0)
        .await
        .unwrap();
    engine
        .update_progress("relay", "ana", "steps", 200.0)
        .await
        .unwrap();
    engine
        .update_progress("relay", "ben", "reps", 20.0)
        .await
        .unwrap();
    engine
        .update_progress("relay", "cai", "steps", 300.0)
        .await
        .unwrap();

    let standings = engine.get_team_leaderboard("relay").await.unwrap();
    assert_eq!(standings.len(), 2);
    assert_eq!(standings[0].team_id, "blue");
    assert_eq!(standings[0].total_score, 300.0);
    assert_eq!(standings[1].team_id, "red");
    assert_eq!(standings[1].member_count, 2);
    assert_eq!(standings[1].total_score, 250.0);
    assert_eq!(standings[1].average_score, 125.0);
    assert_eq!(standings[1].rank, 2);

    let missing = engine.join("relay", "dee", Some("green")).await;
    assert!(matches!(missing, Err(Error::UnknownTeam { .. })));
}

#[tokio::test]
async fn test_team_operations_rejected_on_individual_challenge() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "solo",
            ChallengeType::Individual,
            vec![requirement("reps", "reps", 10.0)],
        ))
        .await
        .unwrap();

    assert!(matches!(
        engine.create_team("solo", "red").await,
        Err(Error::TeamNotAllowed(_))
    ));
    assert!(matches!(
        engine.join("solo", "ana", Some("red")).await,
        Err(Error::TeamNotAllowed(_))
    ));
    assert!(matches!(
        engine.get_team_leaderboard("solo").await,
        Err(Error::TeamNotAllowed(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_are_not_lost() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "jumps",
            ChallengeType::Individual,
            vec![requirement("reps", "reps", 1000.0)],
        ))
        .await
        .unwrap();
    engine.join("jumps", "ana", None).await.unwrap();
    engine.join("jumps", "ben", None).await.unwrap();

    let mut handles = vec![];
    for index in 0..40 {
        let engine = engine.clone();
        let user_id = if index % 2 == 0 { "ana" } else { "ben" };
        handles.push(tokio::spawn(async move {
            engine.update_progress("jumps", user_id, "reps", 1.0).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let board = engine.get_leaderboard("jumps").await.unwrap();
    assert_eq!(board.len(), 2);
    assert!(board.iter().all(|entry| entry.score == 20.0));
}

#[tokio::test]
async fn test_activity_events_route_through_metric_mappings() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "walks",
            ChallengeType::Individual,
            vec![requirement("daily-steps", "Steps", 10000.0)],
        ))
        .await
        .unwrap();
    engine.join("walks", "ana", None).await.unwrap();

    let event = |metric_type: &str, value: f64, timestamp| ActivityEvent {
        user_id: String::from("ana"),
        metric_type: metric_type.to_string(),
        value,
        timestamp,
    };

    let applied = engine
        .handle_activity_event(&event("step_count", 2500.0, DURING))
        .await
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].requirement_id, "daily-steps");
    assert_eq!(applied[0].progress, 2500.0);

    let unmapped = engine
        .handle_activity_event(&event("heart_rate", 120.0, DURING))
        .await
        .unwrap();
    assert!(unmapped.is_empty());

    let outside_window = engine
        .handle_activity_event(&event("steps", 500.0, START - Duration::days(1)))
        .await
        .unwrap();
    assert!(outside_window.is_empty());

    let mut stranger = event("steps", 500.0, DURING);
    stranger.user_id = String::from("ben");
    assert!(engine
        .handle_activity_event(&stranger)
        .await
        .unwrap()
        .is_empty());

    assert!(matches!(
        engine
            .handle_activity_event(&event("steps", -5.0, DURING))
            .await,
        Err(Error::InvalidProgressDelta(_))
    ));

    let board = engine.get_leaderboard("walks").await.unwrap();
    assert_eq!(board[0].score, 2500.0);
}

#[tokio::test]
async fn test_leave_and_rejoin_starts_fresh() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "yoga",
            ChallengeType::Individual,
            vec![requirement("sessions", "sessions", 5.0)],
        ))
        .await
        .unwrap();
    engine.join("yoga", "ana", None).await.unwrap();
    engine
        .update_progress("yoga", "ana", "sessions", 3.0)
        .await
        .unwrap();

    let departed = engine.leave("yoga", "ana").await.unwrap();
    assert_eq!(departed.progress_for("sessions"), 3.0);
    assert!(engine.get_leaderboard("yoga").await.unwrap().is_empty());
    assert!(matches!(
        engine.leave("yoga", "ana").await,
        Err(Error::UnknownParticipant { .. })
    ));

    let rejoined = engine.join("yoga", "ana", None).await.unwrap();
    assert_eq!(rejoined.participant.progress_for("sessions"), 0.0);
    assert!(rejoined.achievements.is_empty());
}

#[tokio::test]
async fn test_cancelled_challenge_is_terminal() {
    let (engine, _clock) = test_engine();
    engine
        .create_challenge(challenge(
            "swims",
            ChallengeType::Individual,
            vec![requirement("laps", "laps", 20.0)],
        ))
        .await
        .unwrap();
    engine.join("swims", "ana", None).await.unwrap();

    let summary = engine.cancel("swims").await.unwrap();
    assert_eq!(summary.status, ChallengeStatus::Cancelled);

    assert!(matches!(
        engine.join("swims", "ben", None).await,
        Err(Error::ChallengeClosed {
            status: ChallengeStatus::Cancelled,
            ..
        })
    ));
    assert!(matches!(
        engine.cancel("swims").await,
        Err(Error::ChallengeClosed { .. })
    ));
    assert!(engine.finalize_ended_challenges().await.unwrap().is_empty());
}
