use thiserror::Error;

/// Typed failures surfaced to the API layer. Messages deliberately carry
/// no counterpart identity — errors must not become a side channel
/// around masking.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{remaining} more message(s) needed before revealing")]
    ThresholdNotMet { remaining: u64 },

    #[error("you have already requested a reveal for this match")]
    AlreadyRevealed,

    #[error("this match is no longer active")]
    MatchNotActive,

    #[error("the match was updated concurrently, try again")]
    Conflict,

    #[error("not found")]
    NotFound,

    #[error("you are not a party to this match")]
    Unauthorized,

    #[error("this help request is no longer open")]
    RequestNotOpen,

    #[error("you already have an open help request")]
    RequestAlreadyOpen,

    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl MatchError {
    /// Stable machine-readable kind for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThresholdNotMet { .. } => "threshold_not_met",
            Self::AlreadyRevealed => "already_revealed",
            Self::MatchNotActive => "match_not_active",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::RequestNotOpen => "request_not_open",
            Self::RequestAlreadyOpen => "request_already_open",
            Self::Db(_) => "internal",
        }
    }
}

pub type MatchResult<T> = Result<T, MatchError>;
