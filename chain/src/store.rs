//! The block-store seam.
//!
//! Reorganizations occasionally need the body of a block whose transactions
//! were evicted from memory; those reads go through this trait and may
//! suspend. The chain holds its correctness lock across the suspension, so
//! implementations only need to be internally consistent, not transactional.

use {
    ahash::AHashMap,
    async_trait::async_trait,
    ember_types::{Block, Hash32},
    std::sync::Mutex,
    thiserror::Error,
};

/// Errors surfaced by block-store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("block store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored block failed to decode: {0}")]
    Corrupt(String),
}

/// Persistence capability the chain consumes. One retained block per entry.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Load a block body by hash. `Ok(None)` means the store has no such
    /// block, which the chain treats as an inconsistency only when the block
    /// is still inside the retained window.
    async fn load_block(&self, hash: &Hash32) -> Result<Option<Block>, StoreError>;

    /// Persist a block body.
    async fn save_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Drop a block that fell out of the retained window.
    async fn remove_block(&self, hash: &Hash32) -> Result<(), StoreError>;
}

/// In-memory store used by tests and by nodes running without persistence.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<AHashMap<Hash32, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn load_block(&self, hash: &Hash32) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.lock().unwrap().get(hash).cloned())
    }

    async fn save_block(&self, block: &Block) -> Result<(), StoreError> {
        self.blocks.lock().unwrap().insert(block.hash, block.clone());
        Ok(())
    }

    async fn remove_block(&self, hash: &Hash32) -> Result<(), StoreError> {
        self.blocks.lock().unwrap().remove(hash);
        Ok(())
    }
}
