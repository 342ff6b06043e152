//! Blocks: the unit of chain growth.
//!
//! A block is immutable once it has passed superficial validation. Its hash
//! is never carried on the wire; every node recomputes it from content, so a
//! peer cannot claim a false identity for a block body. Transaction payloads
//! may later be evicted from memory for blocks older than the callback
//! horizon, while the header fields survive until the block is purged.

use {
    crate::{
        crypto,
        defs::{
            BlockId, Currency, Hash32, PublicKey, Timestamp, TxOrdinal, EMPTY_HASH,
        },
        transaction::{Transaction, TransactionKind},
    },
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Superficial (stateless) validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block id {got} does not follow previous block id {prev}")]
    NonMonotonicId { prev: BlockId, got: BlockId },

    #[error("block timestamp {got} precedes previous block timestamp {prev}")]
    TimestampRegression { prev: Timestamp, got: Timestamp },

    #[error("transaction at ordinal {ordinal} carries an invalid signature")]
    BadTransactionSignature { ordinal: TxOrdinal },

    #[error("block embeds more than one golden-ticket transaction")]
    MultipleGoldenTickets,

    #[error("block embeds more than one fee-capture transaction")]
    MultipleFeeCaptures,

    #[error("golden-ticket transaction is missing its solution payload")]
    MissingSolution,

    #[error("non-ticket transaction carries a solution payload")]
    UnexpectedSolution,

    #[error("transaction ordinals are not consecutive at position {position}")]
    OrdinalGap { position: usize },

    #[error("output slip coordinates disagree with the containing block")]
    OutputCoordinateMismatch,

    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// A block of the Ember chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Height along this chain path.
    pub id: BlockId,
    /// Content hash. Recomputed locally, never trusted from the wire.
    #[serde(skip)]
    pub hash: Hash32,
    /// Hash of the parent block; all zeros for a genesis candidate.
    pub prevhash: Hash32,
    /// Creation time in ms.
    pub timestamp: Timestamp,
    /// Public key of the bundling node.
    pub creator: PublicKey,
    /// The burn fee this block was priced at, in motes.
    pub burn_fee: Currency,
    /// Revenue split toward the lottery solver, in `PAYSPLIT_SCALE` units.
    pub paysplit: u64,
    /// This block's vote on where the paysplit should move: -1, 0, or +1.
    pub paysplit_vote: i8,
    /// Lottery difficulty in `DIFFICULTY_SCALE` units.
    pub difficulty: u64,
    /// This block's vote on where the difficulty should move.
    pub difficulty_vote: i8,
    /// Treasury balance after this block's monetary roll-forward.
    pub treasury: Currency,
    /// Per-block issuance drawn from the treasury.
    pub coinbase: Currency,
    /// Funds reintroduced from outputs that expired out of the retention
    /// window when this block was bundled.
    pub reclaimed_funds: Currency,
    /// Ordered transactions.
    pub transactions: Vec<Transaction>,
    /// True once transaction payloads have been evicted from memory.
    #[serde(skip)]
    pub pruned: bool,
}

impl Block {
    pub fn new() -> Self {
        Self {
            id: 0,
            hash: EMPTY_HASH,
            prevhash: EMPTY_HASH,
            timestamp: 0,
            creator: [0u8; 32],
            burn_fee: 0,
            paysplit: crate::defs::PAYSPLIT_SCALE / 2,
            paysplit_vote: 0,
            difficulty: 0,
            difficulty_vote: 0,
            treasury: 0,
            coinbase: 0,
            reclaimed_funds: 0,
            transactions: Vec::new(),
            pruned: false,
        }
    }

    /// Deterministic content hash over the header fields and every
    /// transaction signature.
    pub fn compute_hash(&self) -> Hash32 {
        let mut header = Vec::with_capacity(160);
        header.extend_from_slice(&self.id.to_le_bytes());
        header.extend_from_slice(&self.prevhash);
        header.extend_from_slice(&self.timestamp.to_le_bytes());
        header.extend_from_slice(&self.creator);
        header.extend_from_slice(&self.burn_fee.to_le_bytes());
        header.extend_from_slice(&self.paysplit.to_le_bytes());
        header.push(self.paysplit_vote as u8);
        header.extend_from_slice(&self.difficulty.to_le_bytes());
        header.push(self.difficulty_vote as u8);
        header.extend_from_slice(&self.treasury.to_le_bytes());
        header.extend_from_slice(&self.coinbase.to_le_bytes());
        header.extend_from_slice(&self.reclaimed_funds.to_le_bytes());

        let mut slices: Vec<&[u8]> = Vec::with_capacity(1 + self.transactions.len());
        slices.push(&header);
        for tx in &self.transactions {
            slices.push(&tx.signature);
        }
        crypto::hashv(&slices)
    }

    /// Assign transaction ordinals and output-slip coordinates, then fix the
    /// block's hash. `base_ordinal` is one past the previous block's highest
    /// ordinal.
    pub fn seal(&mut self, base_ordinal: TxOrdinal) {
        for (i, tx) in self.transactions.iter_mut().enumerate() {
            tx.ordinal = base_ordinal + i as TxOrdinal;
        }
        for tx in self.transactions.iter_mut() {
            let ordinal = tx.ordinal;
            for (j, slip) in tx.to.iter_mut().enumerate() {
                slip.block_id = self.id;
                slip.tx_ordinal = ordinal;
                slip.slip_index = j as u64;
            }
        }
        self.hash = self.compute_hash();
        // Output coordinates include the origin hash, which only exists now.
        let hash = self.hash;
        for tx in self.transactions.iter_mut() {
            for slip in tx.to.iter_mut() {
                slip.block_hash = hash;
            }
        }
    }

    /// Index of the embedded golden-ticket transaction, if any.
    pub fn ticket_index(&self) -> Option<usize> {
        self.transactions.iter().position(Transaction::is_golden_ticket)
    }

    pub fn ticket_transaction(&self) -> Option<&Transaction> {
        self.ticket_index().map(|i| &self.transactions[i])
    }

    pub fn has_golden_ticket(&self) -> bool {
        self.ticket_index().is_some()
    }

    /// Total fees collected by this block's transactions.
    pub fn total_fees(&self) -> Currency {
        self.transactions
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee()))
    }

    pub fn min_tx_ordinal(&self) -> TxOrdinal {
        self.transactions.first().map(|tx| tx.ordinal).unwrap_or(0)
    }

    pub fn max_tx_ordinal(&self) -> TxOrdinal {
        self.transactions.last().map(|tx| tx.ordinal).unwrap_or(0)
    }

    pub fn is_genesis_candidate(&self) -> bool {
        self.prevhash == EMPTY_HASH
    }

    /// Stateless validation: signatures, linkage against the parent when we
    /// have it, synthetic-transaction multiplicity, ordinal continuity, and
    /// output-coordinate consistency. Spend checks happen later, at winding.
    pub fn superficial_validate(&self, prev: Option<&Block>) -> Result<(), BlockError> {
        if let Some(prev) = prev {
            if self.id != prev.id + 1 {
                return Err(BlockError::NonMonotonicId {
                    prev: prev.id,
                    got: self.id,
                });
            }
            if self.timestamp < prev.timestamp {
                return Err(BlockError::TimestampRegression {
                    prev: prev.timestamp,
                    got: self.timestamp,
                });
            }
        }

        let mut tickets = 0usize;
        let mut captures = 0usize;
        for (position, tx) in self.transactions.iter().enumerate() {
            if !tx.verify_signature() {
                return Err(BlockError::BadTransactionSignature {
                    ordinal: tx.ordinal,
                });
            }
            match tx.kind {
                TransactionKind::GoldenTicket => {
                    tickets += 1;
                    if tx.solution.is_none() {
                        return Err(BlockError::MissingSolution);
                    }
                }
                TransactionKind::FeeCapture => captures += 1,
                TransactionKind::Normal => {
                    if tx.solution.is_some() {
                        return Err(BlockError::UnexpectedSolution);
                    }
                }
            }
            if position > 0
                && tx.ordinal != self.transactions[position - 1].ordinal + 1
            {
                return Err(BlockError::OrdinalGap { position });
            }
            for (j, slip) in tx.to.iter().enumerate() {
                if slip.block_id != self.id
                    || slip.tx_ordinal != tx.ordinal
                    || slip.slip_index != j as u64
                    || slip.block_hash != self.hash
                {
                    return Err(BlockError::OutputCoordinateMismatch);
                }
            }
        }
        if tickets > 1 {
            return Err(BlockError::MultipleGoldenTickets);
        }
        if captures > 1 {
            return Err(BlockError::MultipleFeeCaptures);
        }
        Ok(())
    }

    /// Evict transaction payloads once the block is older than the callback
    /// horizon. Header fields stay; the hash is already fixed.
    pub fn prune_transaction_data(&mut self) {
        self.transactions.clear();
        self.transactions.shrink_to_fit();
        self.pruned = true;
    }

    /// Wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of this struct cannot fail.
        bincode::serialize(self).unwrap()
    }

    /// Decode from the wire and recompute the content hash.
    pub fn from_bytes(bytes: &[u8]) -> Result<Block, BlockError> {
        let mut block: Block =
            bincode::deserialize(bytes).map_err(|e| BlockError::Decode(e.to_string()))?;
        block.hash = block.compute_hash();
        Ok(block)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
