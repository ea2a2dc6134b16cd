//! Error taxonomy for ingestion.
//!
//! Errors are contained at three boundaries: a single participant
//! ([`ParticipantError`]), a single upstream call ([`ApiError`]) and a whole
//! job ([`IngestError`]).

use std::time::Duration;

use thiserror::Error;

/// Failure of one upstream API call.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream unavailable: {0}")]
    Upstream(String),
}

impl ApiError {
    /// Whether this error must abort the running job rather than skip one item.
    pub fn is_job_fatal(&self) -> bool {
        !matches!(self, ApiError::NotFound(_))
    }
}

/// Why one participant entry of a match payload was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParticipantError {
    #[error("unknown champion {0:?}")]
    UnknownChampion(String),

    #[error("unknown summoner spell {0}")]
    UnknownSpell(u32),

    #[error("missing field {0}")]
    MissingField(&'static str),
}

/// Failure to import one match payload.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The payload cannot be turned into a Match row at all.
    #[error("malformed payload for {match_id}: {reason}")]
    Malformed { match_id: String, reason: String },

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ImportError {
    fn from(value: rusqlite::Error) -> Self {
        ImportError::Storage(value.into())
    }
}

/// Job-level failure.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("summoner {0} is already being parsed")]
    AlreadyParsing(String),

    #[error("summoner {0} does not exist")]
    SummonerNotFound(String),

    /// Another task took over the summoner after this task's lease expired.
    #[error("lease for summoner {0} was lost")]
    LeaseLost(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for IngestError {
    fn from(value: rusqlite::Error) -> Self {
        IngestError::Storage(value.into())
    }
}
