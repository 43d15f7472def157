//! Event session: stream subscriptions and payload demultiplexing
//!
//! Payloads pushed by the authority read `"<channel> <kind> <args>"`:
//! - `block <hash>`: the chain advanced to a new head
//! - `ping <payload>`: the authority expects a pong
//! - `end`: the game is over

use tc_api::ApiClient;

/// Event delivered to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A new chain head was announced
    NewBlock { hash: String },
    /// The game was refetched and its current round confirmed
    RoundSynced { round: u64, last_block: String },
    /// A ping was received and answered
    Pinged { payload: String },
    GameEnded,
}

/// Decoded game channel notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Block { hash: String },
    Ping { payload: String },
    End,
}

impl GameEvent {
    /// Split a payload into its channel and event; malformed payloads yield `None`
    pub fn parse(payload: &str) -> Option<(&str, GameEvent)> {
        let (channel, rest) = payload.trim_end().split_once(' ')?;
        let (kind, args) = rest.split_once(' ').unwrap_or((rest, ""));
        let event = match kind {
            "block" => {
                let mut args = args.split_whitespace();
                let hash = args.next()?;
                if args.next().is_some() {
                    return None;
                }
                GameEvent::Block {
                    hash: hash.to_string(),
                }
            }
            "ping" => GameEvent::Ping {
                payload: args.to_string(),
            },
            "end" => GameEvent::End,
            _ => return None,
        };
        if channel.is_empty() {
            return None;
        }
        Some((channel, event))
    }
}

/// Channels this client listens to, and the stream session they apply to
///
/// A channel is sent to the authority at most once per session; all of them
/// are replayed when a new session key is obtained.
#[derive(Debug, Default)]
pub struct Subscriptions {
    stream_key: Option<String>,
    channels: Vec<String>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn stream_key(&self) -> Option<&str> {
        self.stream_key.as_deref()
    }

    /// Add a channel, forwarding it to the current session if there is one
    pub async fn subscribe(&mut self, api: &ApiClient, channel: &str) -> tc_api::Result<()> {
        if self.channels.iter().any(|c| c == channel) {
            return Ok(());
        }
        if let Some(key) = &self.stream_key {
            api.subscribe(key, &[channel.to_string()]).await?;
        }
        self.channels.push(channel.to_string());
        Ok(())
    }

    /// Switch to a new session and subscribe it to every known channel
    pub async fn attach(&mut self, api: &ApiClient, stream_key: &str) -> tc_api::Result<()> {
        if !self.channels.is_empty() {
            api.subscribe(stream_key, &self.channels).await?;
        }
        self.stream_key = Some(stream_key.to_string());
        Ok(())
    }
}
