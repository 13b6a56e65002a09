use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use circle_match::MatchError;

/// JSON error body the client renders directly: the kind drives the UI
/// state, `remaining` feeds the "N more messages" copy.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError(pub MatchError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MatchError::ThresholdNotMet { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            MatchError::AlreadyRevealed => StatusCode::CONFLICT,
            MatchError::Conflict => StatusCode::CONFLICT,
            MatchError::RequestAlreadyOpen => StatusCode::CONFLICT,
            MatchError::MatchNotActive => StatusCode::GONE,
            MatchError::RequestNotOpen => StatusCode::GONE,
            MatchError::NotFound => StatusCode::NOT_FOUND,
            MatchError::Unauthorized => StatusCode::FORBIDDEN,
            MatchError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let remaining = match &self.0 {
            MatchError::ThresholdNotMet { remaining } => Some(*remaining),
            _ => None,
        };

        // Internal details stay in the logs, not the response
        let message = match &self.0 {
            MatchError::Db(e) => {
                error!("internal error: {:#}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.0.kind(),
            message,
            remaining,
        };
        (status, Json(body)).into_response()
    }
}

impl From<MatchError> for ApiError {
    fn from(err: MatchError) -> Self {
        Self(err)
    }
}
