use arena_core::Achievement;
use axum::{
    extract::{Path, State},
    response::ErrorResponse,
    Json,
};
use log::error;
use std::sync::Arc;

use crate::{domain::ChallengeSummary, startup::AppState};

pub async fn get_user_challenges(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ChallengeSummary>>, ErrorResponse> {
    state
        .engine
        .get_user_challenges(&user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting challenges for user {}: {:?}", user_id, e);
            e.into()
        })
}

pub async fn get_achievements(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Achievement>>, ErrorResponse> {
    state
        .engine
        .get_achievements(&user_id)
        .await
        .map(Json)
        .map_err(|e| {
            error!("error getting achievements for user {}: {:?}", user_id, e);
            e.into()
        })
}
