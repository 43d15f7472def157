//! Contest authority API client
//!
//! Provides:
//! - Plain JSON calls (body decoded directly)
//! - Signed calls (canonical envelope, `{result, error, details}` response)
//! - Typed wrappers for games, rounds, pings and event-stream sessions

pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, ApiConfig, API_VERSION};
pub use error::{Error, Result, ROUND_CONFLICT};
pub use types::{GameState, PingOutcome, PlayerInfo, ProtocolSource};
