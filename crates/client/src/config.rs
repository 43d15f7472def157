//! Client configuration

use serde::{Deserialize, Serialize};

/// Default prefix of a game's event channel
pub const DEFAULT_CHANNEL_PREFIX: &str = "game:";

/// A bot played by this team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: u32,
    /// Shell command printing the bot's commands for a round
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Task identifier, parent of a new game's protocol block
    pub task: String,
    pub bots: Vec<BotConfig>,
    /// Send commands automatically whenever a new round is observed
    pub eager_send: bool,
    pub channel_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            task: String::new(),
            bots: Vec::new(),
            eager_send: true,
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            ..Default::default()
        }
    }

    pub fn with_bots(mut self, bots: Vec<BotConfig>) -> Self {
        self.bots = bots;
        self
    }

    pub fn with_eager_send(mut self, eager: bool) -> Self {
        self.eager_send = eager;
        self
    }

    pub fn bot_ids(&self) -> Vec<u32> {
        self.bots.iter().map(|b| b.id).collect()
    }

    /// Event channel carrying a game's notifications
    pub fn game_channel(&self, game_key: &str) -> String {
        format!("{}{}", self.channel_prefix, game_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"task": "t1", "bots": [{"id": 3, "command": "./bot"}]}"#).unwrap();
        assert_eq!(config.task, "t1");
        assert!(config.eager_send);
        assert_eq!(config.bot_ids(), vec![3]);
        assert_eq!(config.game_channel("abc"), "game:abc");
    }
}
