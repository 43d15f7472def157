//! Node configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tc_api::ProtocolSource;
use tc_client::{BotConfig, ClientConfig};

/// Source files of the game protocol submitted with `new`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolFiles {
    pub interface: PathBuf,
    pub implementation: PathBuf,
}

/// Node configuration, read from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Contest site root
    pub base_url: String,
    /// API root; `{base_url}/backend` when absent
    #[serde(default)]
    pub api_base: Option<String>,
    /// Block archive root; `{base_url}/backend/Blocks` when absent
    #[serde(default)]
    pub store_base: Option<String>,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Base64 API key of the team
    pub api_key: String,
    pub task: String,
    /// Team key pair file
    #[serde(default = "default_signing")]
    pub signing: PathBuf,
    #[serde(default = "default_snapshot")]
    pub snapshot: PathBuf,
    #[serde(default)]
    pub new_game_params: Value,
    #[serde(default)]
    pub protocol: Option<ProtocolFiles>,
    #[serde(default)]
    pub players: Vec<BotConfig>,
    #[serde(default = "default_eager_send")]
    pub eager_send: bool,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("store")
}

fn default_signing() -> PathBuf {
    PathBuf::from("team.json")
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("game.json")
}

fn default_eager_send() -> bool {
    true
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {:?}", path))?;
        Self::parse(&text).with_context(|| format!("parsing configuration {:?}", path))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn api_base(&self) -> String {
        self.api_base
            .clone()
            .unwrap_or_else(|| format!("{}/backend", self.base()))
    }

    pub fn store_base(&self) -> String {
        self.store_base
            .clone()
            .unwrap_or_else(|| format!("{}/backend/Blocks", self.base()))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.task)
            .with_bots(self.players.clone())
            .with_eager_send(self.eager_send)
    }

    /// Read the protocol source files
    pub fn protocol_source(&self) -> Result<ProtocolSource> {
        let files = self
            .protocol
            .as_ref()
            .context("no protocol files configured")?;
        let read = |path: &Path| {
            std::fs::read_to_string(path).with_context(|| format!("reading protocol file {:?}", path))
        };
        Ok(ProtocolSource {
            interface: read(&files.interface)?,
            implementation: read(&files.implementation)?,
        })
    }
}
