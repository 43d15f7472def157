//! Block Store - verified, round-indexed cache of chain blocks
//!
//! Blocks are downloaded as zip archives, checked against their content
//! hash, and kept on disk:
//! - under `<cache>/<hash>/` until their round is known
//! - under `<cache>/<round>/` once confirmed, recorded in `index.txt`

pub mod archive;
pub mod block;
pub mod error;
pub mod index;
pub mod store;

pub use block::{Block, BlockHash, BlockPayload, PlayerCommand};
pub use error::{Error, Result};
pub use index::Index;
pub use store::{BlockStore, StoreConfig};

/// Name of the block document inside an archive
pub const BLOCK_FILE: &str = "block.json";

/// Name of the optional state document carrying the round number
pub const STATE_FILE: &str = "state.json";

/// Name of the hash-to-round index file
pub const INDEX_FILE: &str = "index.txt";
