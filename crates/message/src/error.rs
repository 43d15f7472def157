//! Signing errors

use thiserror::Error;

/// Errors raised while encoding or signing a message
#[derive(Error, Debug)]
pub enum Error {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
