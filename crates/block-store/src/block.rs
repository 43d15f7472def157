//! Chain blocks and their content hashes

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::fmt;

/// Content hash of a block: SHA-1 of the raw `block.json` bytes, base64url without padding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Hash raw block bytes exactly as stored
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Sha1::digest(bytes);
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this has the shape of an encoded SHA-1 digest: 27 base64url characters
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == ENCODED_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

/// Length of an unpadded base64url SHA-1 digest
const ENCODED_LEN: usize = 27;

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlockHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BlockHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One command entered by a player for a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCommand {
    pub player_rank: u32,
    pub command: String,
}

/// Type-specific part of a block
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockPayload {
    /// Game protocol source
    Protocol {
        interface: String,
        implementation: String,
    },
    /// Game parameters
    Setup {
        #[serde(default)]
        game_params: Value,
    },
    /// Commands entered by each player, per cycle
    Command {
        #[serde(default)]
        commands: Vec<Vec<PlayerCommand>>,
    },
    /// Task roots and block types this client does not interpret
    #[serde(other)]
    Other,
}

/// An immutable chain node
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Block {
    /// Previous block; `None` for the chain root
    #[serde(default, deserialize_with = "deserialize_parent")]
    pub parent: Option<BlockHash>,
    /// Round at which the authority appended the block
    #[serde(default, alias = "sequence")]
    pub round: u64,
    #[serde(flatten)]
    pub payload: BlockPayload,
}

impl Block {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

// The authority writes an empty string for the root's parent
fn deserialize_parent<'de, D>(deserializer: D) -> Result<Option<BlockHash>, D::Error>
where
    D: Deserializer<'de>,
{
    let parent: Option<String> = Option::deserialize(deserializer)?;
    Ok(parent.filter(|p| !p.is_empty()).map(BlockHash))
}
