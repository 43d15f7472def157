//! Block Store - fetch, verify and cache blocks by content hash
//!
//! Layout of the cache directory:
//! - `<hash>/` staging directory for a block whose round is unknown
//! - `<round>/` directory of a verified block whose round is confirmed
//! - `index.txt` append-only `hash round` mapping
//!
//! A block is always verified while it sits in its hash-named directory and
//! only then moved under its round, so a round-named directory never holds
//! unverified content.

use crate::archive;
use crate::block::{Block, BlockHash};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::{BLOCK_FILE, INDEX_FILE, STATE_FILE};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Block store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL serving `{base_url}/{hash}/zip`
    pub base_url: String,
    /// Local cache directory
    pub cache_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(base_url: &str, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
        }
    }
}

/// Verified, round-indexed cache of chain blocks
pub struct BlockStore {
    http: reqwest::Client,
    config: StoreConfig,
    /// Every block in this map has been hash-verified
    blocks: HashMap<BlockHash, Arc<Block>>,
    index: Index,
    fetches: u64,
}

impl BlockStore {
    /// Open the cache directory, creating it if needed
    ///
    /// Blocks already on disk are loaded into memory; directories holding an
    /// unparseable block are deleted so the block is downloaded again.
    pub fn open(config: StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        let mut index = Index::new(&config.cache_dir, INDEX_FILE);
        index.load()?;

        let mut store = Self {
            http: reqwest::Client::new(),
            config,
            blocks: HashMap::new(),
            index,
            fetches: 0,
        };
        store.load_cached()?;

        tracing::info!(
            "Block store at {:?}: {} blocks cached, {} indexed",
            store.config.cache_dir,
            store.blocks.len(),
            store.index.len()
        );
        Ok(store)
    }

    /// Use a shared HTTP client
    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    /// Get a block, downloading and verifying it if not cached
    pub async fn get(&mut self, hash: &BlockHash) -> Result<Arc<Block>> {
        if let Some(block) = self.blocks.get(hash) {
            return Ok(block.clone());
        }
        // The hash names a directory under the cache; anything else must not touch the disk
        if !hash.is_well_formed() {
            return Err(Error::Security {
                path: hash.to_string(),
            });
        }

        let staging = self.config.cache_dir.join(hash.as_str());
        remove_dir_if_exists(&staging)?;
        std::fs::create_dir_all(&staging)?;

        let block = match self.fetch_verified(hash, &staging).await {
            Ok(block) => block,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        let round = read_round(&staging).or_else(|| self.index.round_of(hash));
        if let Some(round) = round {
            let target = self.round_dir(round);
            remove_dir_if_exists(&target)?;
            std::fs::rename(&staging, &target)?;
            if self.index.round_of(hash) != Some(round) {
                self.index.add(hash, round)?;
            }
            tracing::debug!("Block {} stored as round {}", hash, round);
        } else {
            tracing::debug!("Block {} has no round, kept under its hash", hash);
        }

        let block = Arc::new(block);
        self.blocks.insert(hash.clone(), block.clone());
        Ok(block)
    }

    async fn fetch_verified(&mut self, hash: &BlockHash, dest: &Path) -> Result<Block> {
        let url = format!("{}/{}/zip", self.config.base_url, hash);
        tracing::debug!("Fetching {}", url);
        self.fetches += 1;

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport {
                url,
                status: status.to_string(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        archive::extract(&bytes, dest)?;

        let raw = match std::fs::read(dest.join(BLOCK_FILE)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingBlock {
                    hash: hash.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let actual = BlockHash::compute(&raw);
        if &actual != hash {
            tracing::warn!("Rejecting block {}: content hashes to {}", hash, actual);
            return Err(Error::Integrity {
                expected: hash.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(Block::parse(&raw)?)
    }

    /// Walk parent links from `last` back to `first`, loading every block
    ///
    /// Stops at `first` or at the chain root; the first failure aborts the
    /// walk. Returns the number of blocks visited.
    pub async fn get_chain(&mut self, first: &BlockHash, last: &BlockHash) -> Result<usize> {
        let mut visited = 0;
        let mut next = Some(last.clone());
        while let Some(hash) = next {
            let block = self.get(&hash).await?;
            visited += 1;
            if &hash == first {
                break;
            }
            next = block.parent.clone();
        }
        tracing::debug!("Chain {}..{}: {} blocks", first, last, visited);
        Ok(visited)
    }

    /// Wipe the cache directory and forget every block and mapping
    pub fn clear(&mut self) -> Result<()> {
        remove_dir_if_exists(&self.config.cache_dir)?;
        std::fs::create_dir_all(&self.config.cache_dir)?;
        self.blocks.clear();
        self.index.reset();
        tracing::info!("Cleared block store {:?}", self.config.cache_dir);
        Ok(())
    }

    /// Confirmed round of a block
    pub fn round_of(&self, hash: &BlockHash) -> Option<u64> {
        self.index.round_of(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Number of archive downloads attempted since open
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Directory currently holding a cached block
    pub fn block_dir(&self, hash: &BlockHash) -> Option<PathBuf> {
        if !hash.is_well_formed() {
            return None;
        }
        let dir = match self.index.round_of(hash) {
            Some(round) => self.round_dir(round),
            None => self.config.cache_dir.join(hash.as_str()),
        };
        dir.join(BLOCK_FILE).exists().then_some(dir)
    }

    fn round_dir(&self, round: u64) -> PathBuf {
        self.config.cache_dir.join(round.to_string())
    }

    fn load_cached(&mut self) -> Result<()> {
        for entry in std::fs::read_dir(&self.config.cache_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let raw = match std::fs::read(path.join(BLOCK_FILE)) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::debug!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };
            match Block::parse(&raw) {
                Ok(block) => {
                    let hash = BlockHash::compute(&raw);
                    self.reindex(&hash, &path)?;
                    self.blocks.insert(hash, Arc::new(block));
                }
                Err(e) => {
                    tracing::warn!("Deleting bad cached block {:?}: {}", path, e);
                    remove_dir_if_exists(&path)?;
                }
            }
        }
        Ok(())
    }

    /// Restore a missing index entry for a block already moved under its round
    fn reindex(&mut self, hash: &BlockHash, dir: &Path) -> Result<()> {
        let Some(round) = read_round(dir) else {
            return Ok(());
        };
        let under_round = dir.file_name().and_then(|n| n.to_str()) == Some(round.to_string().as_str());
        if under_round && self.index.round_of(hash) != Some(round) {
            tracing::info!("Re-indexing block {} as round {}", hash, round);
            self.index.add(hash, round)?;
        }
        Ok(())
    }
}

/// Round from `state.json`; absence or a bad document yields `None`
fn read_round(dir: &Path) -> Option<u64> {
    let raw = std::fs::read(dir.join(STATE_FILE)).ok()?;
    let state: serde_json::Value = serde_json::from_slice(&raw).ok()?;
    state.get("round")?.as_u64()
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
