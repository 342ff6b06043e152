//! Peer wire messages.
//!
//! Every frame on the peer channel is a length-checked bincode encoding of
//! [`PeerMessage`]. The enum is closed and matched exhaustively; adding a
//! message kind is a compile-visible change everywhere it is handled.

use {
    ember_types::{BlockId, Hash32, PublicKey, TicketSolution},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Hard cap on an encoded message, block payloads included.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 3;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("message too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: usize, max: usize },
}

/// Top-level peer message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Handshake request.
    Connect {
        node: PublicKey,
        version: u32,
    },

    /// Handshake acceptance, carrying the responder's chain position.
    ConnectReply {
        node: PublicKey,
        latest_block_id: BlockId,
        fork_id: String,
    },

    /// Handshake refusal.
    ConnectDeny {
        reason: String,
    },

    /// A full block body. The receiver recomputes the hash and must see
    /// `expected_hash`; a mismatch is a validation failure on the sender.
    Block {
        bytes: Vec<u8>,
        expected_hash: Hash32,
    },

    /// Announcement that a block exists, without its body.
    BlockAvailable {
        hash: Hash32,
        block_id: BlockId,
    },

    /// Request for a block body we reference but do not hold.
    MissingBlock {
        hash: Hash32,
    },

    /// A pending transaction.
    Transaction {
        bytes: Vec<u8>,
    },

    /// A lottery solution racing toward the next bundle.
    GoldenTicket {
        solution: TicketSolution,
    },

    /// Request to locate the common sync point and stream what follows.
    BlockchainRequest {
        fork_id: String,
        latest_block_id: BlockId,
    },
}

impl PeerMessage {
    /// Encode for the wire, enforcing the size cap.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let bytes = bincode::serialize(self)?;
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Decode from the wire, enforcing the size cap before parsing.
    pub fn decode(bytes: &[u8]) -> Result<PeerMessage, MessageError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(bincode::deserialize(bytes)?)
    }
}
