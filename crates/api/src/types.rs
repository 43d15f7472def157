//! Wire types exchanged with the authority

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a game as reported by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub key: String,
    #[serde(default)]
    pub owner_id: String,
    pub first_block: String,
    pub last_block: String,
    #[serde(default)]
    pub current_round: u64,
    #[serde(default)]
    pub nb_cycles_per_round: u32,
    #[serde(default)]
    pub round_ends: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "locked")]
    pub is_locked: bool,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
}

/// Registered player slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub rank: u32,
    pub team_key: String,
    pub team_player: u32,
}

/// Protocol interface/implementation pair submitted as the first game block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSource {
    pub interface: String,
    pub implementation: String,
}

/// Result of pinging every node playing a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    /// All nodes answered
    AllResponsive,
    /// At least one node timed out
    SomeUnresponsive,
}

/// Uniform response wrapper used by signed calls
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub result: Option<T>,
    pub error: Option<String>,
    pub details: Option<String>,
}

/// Response of the block creation calls
#[derive(Debug, Deserialize)]
pub(crate) struct HashResponse {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub details: String,
}
