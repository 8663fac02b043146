use arena_core::{
    Achievement, ActivityEvent, CreateChallenge, LeaderboardEntry, Participant, Team, TeamStanding,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use log::{debug, error};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    domain::{ChallengeSummary, JoinOutcome, ProgressOutcome, ProgressUpdate},
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub user_id: String,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub user_id: String,
    pub requirement_id: String,
    pub delta: f64,
}

pub async fn create_challenge(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateChallenge>,
) -> Result<(StatusCode, Json<ChallengeSummary>), ErrorResponse> {
    state
        .engine
        .create_challenge(body)
        .await
        .map(|summary| (StatusCode::CREATED, Json(summary)))
        .map_err(|e| {
            error!("error creating challenge: {:?}", e);
            e.into()
        })
}

pub async fn get_challenges(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChallengeSummary>>, ErrorResponse> {
    state
        .engine
        .list_challenges()
        .await
        .map(Json)
        .map_err(|e| {
            error!("error listing challenges: {:?}", e);
            e.into()
        })
}

pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChallengeSummary>, ErrorResponse> {
    state
        .engine
        .get_challenge(&challenge_id)
        .await
        .map(Json)
        .map_err(|e| {
            debug!("error getting challenge {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn create_team(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(body): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<Team>), ErrorResponse> {
    state
        .engine
        .create_team(&challenge_id, &body.team_id)
        .await
        .map(|team| (StatusCode::CREATED, Json(team)))
        .map_err(|e| {
            error!("error creating team in {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn join_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(body): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinOutcome>), ErrorResponse> {
    state
        .engine
        .join(&challenge_id, &body.user_id, body.team.as_deref())
        .await
        .map(|outcome| (StatusCode::CREATED, Json(outcome)))
        .map_err(|e| {
            error!("error joining challenge {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn leave_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(body): Json<LeaveRequest>,
) -> Result<Json<Participant>, ErrorResponse> {
    state
        .engine
        .leave(&challenge_id, &body.user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error leaving challenge {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn cancel_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChallengeSummary>, ErrorResponse> {
    state
        .engine
        .cancel(&challenge_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error cancelling challenge {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
    Json(body): Json<ProgressRequest>,
) -> Result<Json<ProgressOutcome>, ErrorResponse> {
    state
        .engine
        .update_progress(
            &challenge_id,
            &body.user_id,
            &body.requirement_id,
            body.delta,
        )
        .await
        .map(Json)
        .map_err(|e| {
            error!("error updating progress in {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn award_rewards(
    State(state): State<Arc<AppState>>,
    Path((challenge_id, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Achievement>>, ErrorResponse> {
    state
        .engine
        .award_if_eligible(&challenge_id, &user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(
                "error awarding rewards to {} in {}: {:?}",
                user_id, challenge_id, e
            );
            e.into()
        })
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<Vec<LeaderboardEntry>>, ErrorResponse> {
    state
        .engine
        .get_leaderboard(&challenge_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting leaderboard for {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn get_team_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<Vec<TeamStanding>>, ErrorResponse> {
    state
        .engine
        .get_team_leaderboard(&challenge_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting teams for {}: {:?}", challenge_id, e);
            e.into()
        })
}

pub async fn record_activity(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ActivityEvent>,
) -> Result<Json<Vec<ProgressUpdate>>, ErrorResponse> {
    state
        .engine
        .handle_activity_event(&event)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error recording activity for {}: {:?}", event.user_id, e);
            e.into()
        })
}
