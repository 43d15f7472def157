//! Event stream errors
//!
//! Only the first connection attempt reports errors; later drops are handled
//! by the reconnect loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to connect to event stream: {0}")]
    Connect(#[from] reqwest::Error),

    #[error("event stream refused: {status}: {body}")]
    Status { status: String, body: String },
}

pub type Result<T> = std::result::Result<T, Error>;
