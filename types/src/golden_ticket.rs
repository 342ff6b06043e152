//! The golden-ticket lottery solution payload.
//!
//! One solution is found per block by whichever node first solves the
//! hash puzzle against the previous block; it rides into the next block as a
//! `GoldenTicket` transaction and pays out that block's reward. Validation
//! and construction logic lives in the lottery crate; this is the wire shape.

use {
    crate::defs::{Currency, Hash32, PublicKey, SignatureBytes, EMPTY_SIGNATURE},
    serde::{Deserialize, Serialize},
    serde_big_array::BigArray,
};

/// A candidate lottery solution targeting a specific block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSolution {
    /// Hash of the block this solution solves. Must equal the previous
    /// block's hash when the solution is wound into the chain.
    pub target: Hash32,
    /// The solver's stance on the next block's difficulty: -1, 0, or +1.
    pub difficulty_vote: i8,
    /// The solver's stance on the next block's paysplit: -1, 0, or +1.
    pub paysplit_vote: i8,
    /// The solving miner's public key.
    pub miner: PublicKey,
    /// The nonce that, hashed with the miner key, satisfies the difficulty.
    pub random_nonce: Hash32,
    /// Reward claimed by the miner, in motes.
    pub miner_share: Currency,
    /// Reward claimed for the secondary recipient, in motes.
    pub node_share: Currency,
    /// Miner's signature over the solution fields.
    #[serde(with = "BigArray")]
    pub signature: SignatureBytes,
}

impl TicketSolution {
    pub fn new(target: Hash32, miner: PublicKey, random_nonce: Hash32) -> Self {
        Self {
            target,
            difficulty_vote: 0,
            paysplit_vote: 0,
            miner,
            random_nonce,
            miner_share: 0,
            node_share: 0,
            signature: EMPTY_SIGNATURE,
        }
    }

    /// Byte form covered by the miner's signature (everything but the
    /// signature itself).
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + 1 + 1 + 32 + 32 + 8 + 8);
        out.extend_from_slice(&self.target);
        out.push(self.difficulty_vote as u8);
        out.push(self.paysplit_vote as u8);
        out.extend_from_slice(&self.miner);
        out.extend_from_slice(&self.random_nonce);
        out.extend_from_slice(&self.miner_share.to_le_bytes());
        out.extend_from_slice(&self.node_share.to_le_bytes());
        out
    }
}
