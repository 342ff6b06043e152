//! Persistence: resume state, one file per retained block, and the
//! spend-map snapshot.
//!
//! All of it sits behind seams the core consumes opaquely: the chain sees a
//! [`BlockStore`], the node sees load/save functions. Formats are simple on
//! purpose: JSON for the small resume state and spend map, the block wire
//! encoding for block files.

use {
    async_trait::async_trait,
    ember_chain::{BlockStore, StoreError},
    ember_ledger::SlipMarker,
    ember_types::{Block, BlockId, Currency, Hash32, SlipKey, Timestamp},
    log::info,
    serde::{Deserialize, Serialize},
    std::path::{Path, PathBuf},
};

/// Extension for block files.
const BLOCK_FILE_EXTENSION: &str = "blk";

/// What a node needs to resume chain tracking after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub latest_block_id: BlockId,
    pub latest_block_hash: String,
    pub latest_timestamp: Timestamp,
    pub fork_id: String,
}

/// Write the resume state as JSON.
pub fn save_node_state(path: &Path, state: &NodeState) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json)
}

/// Read the resume state back; `Ok(None)` when no state was saved yet.
pub fn load_node_state(path: &Path) -> std::io::Result<Option<NodeState>> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// One row of the persisted spend map.
pub type SpendMapRow = (SlipKey, Currency, SlipMarker);

/// Persist the full spend map snapshot.
pub fn save_spend_map(path: &Path, rows: &[SpendMapRow]) -> std::io::Result<()> {
    let json = serde_json::to_string(rows)?;
    std::fs::write(path, json)
}

/// Load a previously saved spend map snapshot.
pub fn load_spend_map(path: &Path) -> std::io::Result<Option<Vec<SpendMapRow>>> {
    match std::fs::read_to_string(path) {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Block store keeping one file per retained block under a data directory.
pub struct FsBlockStore {
    dir: PathBuf,
}

impl FsBlockStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("block store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, hash: &Hash32) -> PathBuf {
        self.dir
            .join(format!("{}.{BLOCK_FILE_EXTENSION}", hex::encode(hash)))
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    async fn load_block(&self, hash: &Hash32) -> Result<Option<Block>, StoreError> {
        match tokio::fs::read(self.path_for(hash)).await {
            Ok(bytes) => {
                let block = Block::from_bytes(&bytes)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                if block.hash != *hash {
                    return Err(StoreError::Corrupt(format!(
                        "block file {} decodes to hash {}",
                        hex::encode(hash),
                        hex::encode(block.hash)
                    )));
                }
                Ok(Some(block))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_block(&self, block: &Block) -> Result<(), StoreError> {
        tokio::fs::write(self.path_for(&block.hash), block.to_bytes()).await?;
        Ok(())
    }

    async fn remove_block(&self, hash: &Hash32) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
