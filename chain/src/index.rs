//! The in-memory index of every tracked block.
//!
//! Entries live in a single vector kept ordered by timestamp, with a
//! secondary hash-to-position map for O(1) lookup. Insertion binary-searches
//! the timestamp so the vector never needs a full re-sort. Exactly one entry
//! carries the longest-chain tip at any moment.

use {
    ahash::AHashMap,
    ember_types::{defs::short_id, Block, BlockId, Currency, Hash32, Timestamp, TxOrdinal},
    log::trace,
};

/// Index metadata retained for a block, long after its transaction payloads
/// may have been evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub hash: Hash32,
    pub prevhash: Hash32,
    pub block_id: BlockId,
    pub min_tx_ordinal: TxOrdinal,
    pub max_tx_ordinal: TxOrdinal,
    pub timestamp: Timestamp,
    pub burn_fee: Currency,
    pub is_longest_chain: bool,
}

impl IndexEntry {
    pub fn from_block(block: &Block) -> Self {
        Self {
            hash: block.hash,
            prevhash: block.prevhash,
            block_id: block.id,
            min_tx_ordinal: block.min_tx_ordinal(),
            max_tx_ordinal: block.max_tx_ordinal(),
            timestamp: block.timestamp,
            burn_fee: block.burn_fee,
            is_longest_chain: false,
        }
    }
}

/// Ordered block index plus hash lookup and the longest-chain tip pointer.
#[derive(Debug, Default)]
pub struct ChainIndex {
    /// Entries ordered by timestamp.
    entries: Vec<IndexEntry>,
    /// Hash to position in `entries`.
    by_hash: AHashMap<Hash32, usize>,
    /// Hash of the current longest-chain tip.
    tip: Option<Hash32>,
}

impl ChainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry at its timestamp-ordered position and return that
    /// position. Positions of later entries shift right; the hash map is
    /// repaired from the insertion point.
    pub fn insert(&mut self, entry: IndexEntry) -> usize {
        let timestamp = entry.timestamp;
        let position = self
            .entries
            .partition_point(|e| e.timestamp <= timestamp);
        trace!(
            "indexing block {} ({}) at position {position}",
            entry.block_id,
            short_id(&entry.hash)
        );
        self.entries.insert(position, entry);
        for (i, e) in self.entries.iter().enumerate().skip(position) {
            self.by_hash.insert(e.hash, i);
        }
        position
    }

    pub fn is_hash_indexed(&self, hash: &Hash32) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn position_of(&self, hash: &Hash32) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn entry_at(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn entry_by_hash(&self, hash: &Hash32) -> Option<&IndexEntry> {
        self.position_of(hash).map(|i| &self.entries[i])
    }

    /// Hash of the current longest-chain tip.
    pub fn tip_hash(&self) -> Option<Hash32> {
        self.tip
    }

    pub fn tip_entry(&self) -> Option<&IndexEntry> {
        self.tip.and_then(|h| self.entry_by_hash(&h))
    }

    /// Flip an entry's longest-chain flag. The tip pointer itself is set by
    /// the reorg engine, atomically with the flags it flips.
    pub fn set_longest_chain(&mut self, hash: &Hash32, longest_chain: bool) {
        if let Some(&i) = self.by_hash.get(hash) {
            self.entries[i].is_longest_chain = longest_chain;
        }
    }

    pub fn set_tip(&mut self, tip: Option<Hash32>) {
        self.tip = tip;
    }

    /// Hash of the longest-chain block at the given id, found by walking the
    /// ancestry from the tip.
    pub fn longest_chain_hash_at(&self, block_id: BlockId) -> Option<Hash32> {
        let mut cursor = self.tip_entry()?;
        loop {
            if cursor.block_id == block_id {
                return Some(cursor.hash);
            }
            if cursor.block_id < block_id {
                return None;
            }
            cursor = self.entry_by_hash(&cursor.prevhash)?;
        }
    }

    /// Positions of the most recent `depth` longest-chain entries, tip
    /// first.
    pub fn longest_chain_positions(&self, depth: usize) -> Vec<usize> {
        let mut positions = Vec::with_capacity(depth);
        let mut cursor = self.tip;
        while positions.len() < depth {
            let Some(hash) = cursor else { break };
            let Some(&position) = self.by_hash.get(&hash) else { break };
            positions.push(position);
            cursor = Some(self.entries[position].prevhash);
        }
        positions
    }

    /// Drop every entry with `block_id < threshold`; returns the hashes of
    /// the removed entries so callers can release the block bodies too.
    pub fn purge_before(&mut self, threshold: BlockId) -> Vec<Hash32> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.block_id < threshold {
                removed.push(e.hash);
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            self.by_hash.clear();
            for (i, e) in self.entries.iter().enumerate() {
                self.by_hash.insert(e.hash, i);
            }
        }
        removed
    }
}
