mod challenges;
mod system;
mod users;

pub use challenges::*;
pub use system::*;
pub use users::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::Error;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Error::UnknownChallenge(_)
            | Error::UnknownParticipant { .. }
            | Error::UnknownRequirement { .. }
            | Error::UnknownTeam { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            Error::DuplicateParticipant { .. }
            | Error::CapacityExceeded { .. }
            | Error::ChallengeClosed { .. } => (StatusCode::CONFLICT, self.to_string()),
            Error::InvalidChallenge(_)
            | Error::InvalidProgressDelta(_)
            | Error::TeamNotAllowed(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::DbError(_) | Error::InvalidJson(_) | Error::Thread(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal server error"),
            ),
        };
        let body = Json(json!({
            "error": error_message,
        }));
        (status, body).into_response()
    }
}
