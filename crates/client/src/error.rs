//! Client errors
//!
//! Lower layers' errors pass through unchanged; this layer adds the
//! conditions only the scheduler can decide on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] tc_api::Error),

    #[error(transparent)]
    Store(#[from] tc_block_store::Error),

    #[error(transparent)]
    Stream(#[from] tc_event_stream::Error),

    #[error(transparent)]
    Signing(#[from] tc_message::Error),

    /// The current block has no known round: the local store is incomplete
    #[error("round of block {hash} is unknown, resync needed")]
    NotSynced { hash: String },

    /// The round boundary moved and a resync did not observe a newer round
    #[error("round {round} changed during submission and no newer round was found")]
    Conflict { round: u64 },

    #[error("no current game")]
    NoGame,

    /// Registration gave none of the configured bots a player rank
    #[error("no bot is registered as a player in this game")]
    NoPlayers,

    /// A bot's command producer failed
    #[error("bot {bot_id} failed: {reason}")]
    Producer { bot_id: u32, reason: String },

    #[error("snapshot error: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("bad snapshot: {0}")]
    SnapshotFormat(#[from] serde_json::Error),

    #[error("command {command} panicked")]
    Panicked { command: String },

    #[error("worker is not running")]
    WorkerGone,
}

impl Error {
    /// Submission rejected because the authority already moved to a new round
    pub fn is_round_conflict(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_round_conflict())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
