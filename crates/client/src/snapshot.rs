//! Persistence of the current game between runs

use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tc_api::GameState;

/// Snapshot file used when none is configured
pub const DEFAULT_SNAPSHOT_FILE: &str = "game.json";

/// Load/save contract for the last known game state
pub trait SnapshotStore: Send + Sync {
    /// Saved game, or `None` when there is no current game
    fn load(&self) -> Result<Option<GameState>>;
    /// Overwrite the saved game
    fn save(&self, game: &GameState) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Snapshot kept as a single JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn load(&self) -> Result<Option<GameState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, game: &GameState) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(game)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Saved game {} to {:?}", game.key, self.path);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
