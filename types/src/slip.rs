//! Slips: the spendable outputs of the ledger.
//!
//! A slip is a single `(address, amount)` output, uniquely identified by the
//! coordinates of its creation: origin block id, transaction ordinal, output
//! index, and origin block hash. Input slips on a transaction's `from` side
//! reference the coordinates of outputs created earlier; output slips on the
//! `to` side receive their coordinates when the containing block is sealed.

use {
    crate::defs::{BlockId, Currency, Hash32, PublicKey, SlipIndex, TxOrdinal, EMPTY_HASH},
    serde::{Deserialize, Serialize},
};

/// What role a slip plays in consensus accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlipKind {
    /// An ordinary payment output.
    Normal,
    /// The zero-origin source slip of a golden-ticket transaction.
    GoldenTicket,
    /// The zero-origin source slip of a bundler's fee-capture transaction.
    FeeCapture,
}

/// Composite identity of a slip. Used as the key of the spend map; never a
/// concatenated string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlipKey {
    pub block_id: BlockId,
    pub tx_ordinal: TxOrdinal,
    pub slip_index: SlipIndex,
    pub block_hash: Hash32,
}

/// A single spendable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slip {
    /// Id of the block this slip was created in.
    pub block_id: BlockId,
    /// Global ordinal of the transaction this slip was created by.
    pub tx_ordinal: TxOrdinal,
    /// Position among that transaction's outputs.
    pub slip_index: SlipIndex,
    /// Hash of the origin block.
    pub block_hash: Hash32,
    /// Owner.
    pub address: PublicKey,
    /// Value in motes.
    pub amount: Currency,
    /// Consensus role.
    pub kind: SlipKind,
    /// Whether the slip currently sits on the longest chain. Transient
    /// bookkeeping, not part of the slip's identity.
    #[serde(default)]
    pub longest_chain: bool,
}

impl Slip {
    /// A payment output to `address`, coordinates assigned later at sealing.
    pub fn new_output(address: PublicKey, amount: Currency) -> Self {
        Self {
            block_id: 0,
            tx_ordinal: 0,
            slip_index: 0,
            block_hash: EMPTY_HASH,
            address,
            amount,
            kind: SlipKind::Normal,
            longest_chain: false,
        }
    }

    /// A zero-origin source slip for synthetic transactions. The `(0, 0, 0)`
    /// coordinate is the sentinel shared by every golden-ticket and
    /// fee-capture source; duplicate detection exempts them by kind.
    pub fn new_sentinel(address: PublicKey, kind: SlipKind) -> Self {
        Self {
            block_id: 0,
            tx_ordinal: 0,
            slip_index: 0,
            block_hash: EMPTY_HASH,
            address,
            amount: 0,
            kind,
            longest_chain: false,
        }
    }

    /// The composite spend-map key for this slip.
    pub fn key(&self) -> SlipKey {
        SlipKey {
            block_id: self.block_id,
            tx_ordinal: self.tx_ordinal,
            slip_index: self.slip_index,
            block_hash: self.block_hash,
        }
    }

    /// True when the slip sits at the `(0, 0, 0)` sentinel coordinate.
    pub fn is_sentinel_origin(&self) -> bool {
        self.block_id == 0 && self.tx_ordinal == 0 && self.slip_index == 0
    }

    /// True when this slip participates in spend accounting. Sentinel
    /// sources of synthetic transactions do not.
    pub fn is_spend_tracked(&self) -> bool {
        self.kind == SlipKind::Normal
    }

    /// Identity bytes: the full coordinates plus owner and amount. Covered
    /// by transaction signatures for `from` slips.
    pub fn identity_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 8 + 8 + 32 + 32 + 8 + 1);
        out.extend_from_slice(&self.block_id.to_le_bytes());
        out.extend_from_slice(&self.tx_ordinal.to_le_bytes());
        out.extend_from_slice(&self.slip_index.to_le_bytes());
        out.extend_from_slice(&self.block_hash);
        out.extend_from_slice(&self.address);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.push(self.kind as u8);
        out
    }

    /// Payload bytes: owner, amount, and kind only. Covered by transaction
    /// signatures for `to` slips, whose coordinates are not yet known when
    /// the wallet signs.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 8 + 1);
        out.extend_from_slice(&self.address);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.push(self.kind as u8);
        out
    }
}
