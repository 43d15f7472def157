//! API client errors

use thiserror::Error;

/// API error reported when commands target a block that is no longer current
pub const ROUND_CONFLICT: &str = "current block has changed";

#[derive(Error, Debug)]
pub enum Error {
    /// Non-2xx HTTP response
    #[error("transport error: {status}: {body}")]
    Transport { status: String, body: String },

    /// Connection-level HTTP failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The authority set the `error` field of its response
    #[error("API error: {message}")]
    Api { message: String, details: String },

    #[error(transparent)]
    Signing(#[from] tc_message::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad server time: {0}")]
    Time(#[from] chrono::ParseError),
}

impl Error {
    /// Whether the authority rejected a submission because the round moved on
    pub fn is_round_conflict(&self) -> bool {
        matches!(self, Error::Api { message, .. } if message == ROUND_CONFLICT)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
