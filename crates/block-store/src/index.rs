//! Append-only `hash round` index
//!
//! Each confirmed mapping is appended as one `hash round\n` line; the file is
//! never rewritten, so a crash can at worst lose the last partial line.

use crate::block::BlockHash;
use crate::error::Result;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct Index {
    path: PathBuf,
    round_by_hash: HashMap<BlockHash, u64>,
}

impl Index {
    /// Index stored as `file_name` inside `dir`; nothing is read until [`Index::load`]
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
            round_by_hash: HashMap::new(),
        }
    }

    /// Load all mappings from disk; a missing file is an empty index
    pub fn load(&mut self) -> Result<usize> {
        self.round_by_hash.clear();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for line in text.lines() {
            let mut parts = line.split(' ');
            let (Some(hash), Some(round), None) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            match round.parse::<u64>() {
                Ok(round) => {
                    self.round_by_hash.insert(BlockHash::from(hash), round);
                }
                Err(_) => tracing::warn!("Skipping bad index line: {}", line),
            }
        }
        tracing::debug!("Loaded {} index entries from {:?}", self.round_by_hash.len(), self.path);
        Ok(self.round_by_hash.len())
    }

    /// Append a mapping to the file and the in-memory map
    pub fn add(&mut self, hash: &BlockHash, round: u64) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{} {}\n", hash, round).as_bytes())?;
        self.round_by_hash.insert(hash.clone(), round);
        Ok(())
    }

    pub fn round_of(&self, hash: &BlockHash) -> Option<u64> {
        self.round_by_hash.get(hash).copied()
    }

    /// Forget all in-memory mappings (the file is left to the caller)
    pub fn reset(&mut self) {
        self.round_by_hash.clear();
    }

    pub fn len(&self) -> usize {
        self.round_by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.round_by_hash.is_empty()
    }
}
