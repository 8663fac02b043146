use arena::{app, AppState};
use arena_core::ChallengeType;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tower::ServiceExt;

use crate::helpers::{challenge, requirement, test_engine};

fn router() -> Router {
    let (engine, _clock) = test_engine();
    app(AppState::new(engine, HashMap::new()), vec![])
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_pushups(router: &Router) {
    let body = serde_json::to_value(challenge(
        "pushups",
        ChallengeType::Individual,
        vec![requirement("reps", "reps", 100.0)],
    ))
    .unwrap();
    let (status, created) = send(router, Method::POST, "/api/v1/challenges", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], "pushups");
    assert_eq!(created["status"], "active");
}

#[tokio::test]
async fn test_join_progress_and_leaderboard() {
    let router = router();
    create_pushups(&router).await;

    let (status, joined) = send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/join",
        Some(json!({ "user_id": "ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(joined["participant"]["user_id"], "ana");
    assert_eq!(joined["achievements"][0]["reward_id"], "joined");

    let (status, progress) = send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/progress",
        Some(json!({ "user_id": "ana", "requirement_id": "reps", "delta": 100.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["progress"], 100.0);
    assert_eq!(progress["newly_completed"], true);
    assert_eq!(progress["rank"], 1);
    assert_eq!(progress["achievements"][0]["reward_id"], "finished");

    let (status, board) = send(
        &router,
        Method::GET,
        "/api/v1/challenges/pushups/leaderboard",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board[0]["user_id"], "ana");
    assert_eq!(board[0]["score"], 100.0);
    assert_eq!(board[0]["progress_percent"], 100.0);

    let (status, achievements) =
        send(&router, Method::GET, "/api/v1/users/ana/achievements", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(achievements.as_array().map(Vec::len), Some(2));

    let (status, challenges) =
        send(&router, Method::GET, "/api/v1/users/ana/challenges", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(challenges[0]["participant_count"], 1);
}

#[tokio::test]
async fn test_errors_map_to_status_codes() {
    let router = router();
    create_pushups(&router).await;

    let (status, body) = send(&router, Method::GET, "/api/v1/challenges/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("missing")));

    let join = json!({ "user_id": "ana" });
    send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/join",
        Some(join.clone()),
    )
    .await;
    let (status, _) = send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/join",
        Some(join),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/progress",
        Some(json!({ "user_id": "ana", "requirement_id": "reps", "delta": -3.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(
        &router,
        Method::GET,
        "/api/v1/challenges/pushups/teams",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_challenge_rejected() {
    let router = router();
    let mut create = challenge(
        "backwards",
        ChallengeType::Individual,
        vec![requirement("reps", "reps", 100.0)],
    );
    std::mem::swap(&mut create.start_date, &mut create.end_date);

    let (status, body) = send(
        &router,
        Method::POST,
        "/api/v1/challenges",
        Some(serde_json::to_value(create).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, listed) = send(&router, Method::GET, "/api/v1/challenges", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_activity_endpoint_applies_progress() {
    let router = router();
    create_pushups(&router).await;
    send(
        &router,
        Method::POST,
        "/api/v1/challenges/pushups/join",
        Some(json!({ "user_id": "ana" })),
    )
    .await;

    let (status, applied) = send(
        &router,
        Method::POST,
        "/api/v1/activity",
        Some(json!({
            "user_id": "ana",
            "metric_type": "workout_reps",
            "value": 30.0,
            "timestamp": "2026-05-10T12:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied[0]["challenge_id"], "pushups");
    assert_eq!(applied[0]["progress"], 30.0);
}

#[tokio::test]
async fn test_health_check() {
    let router = router();
    let (status, _) = send(&router, Method::GET, "/api/v1/health_check", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check_reports_dead_background_thread() {
    let (engine, _clock) = test_engine();
    let finished = tokio::spawn(async {});
    while !finished.is_finished() {
        tokio::task::yield_now().await;
    }
    let threads = HashMap::from([(String::from("challenge_watcher"), finished)]);
    let router = app(AppState::new(engine, threads), vec![]);

    let (status, body) = send(&router, Method::GET, "/api/v1/health_check", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}
