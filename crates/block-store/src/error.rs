//! Block store errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Non-2xx response while fetching an archive
    #[error("failed to GET {url}: {status}: {body}")]
    Transport {
        url: String,
        status: String,
        body: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Downloaded `block.json` does not hash to the requested value
    #[error("block {expected} has bad hash {actual}")]
    Integrity { expected: String, actual: String },

    /// Archive entry would be extracted outside the block directory
    #[error("illegal file path {path} in archive")]
    Security { path: String },

    #[error("bad archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive did not contain a block document
    #[error("archive for block {hash} has no block.json")]
    MissingBlock { hash: String },

    #[error("bad block: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
