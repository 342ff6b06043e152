//! # Ember core types
//!
//! Primitives shared by every crate in the workspace: scalar aliases and
//! fixed-point scales ([`defs`]), the crypto capability ([`crypto`]), and the
//! ledger's data model ([`slip`], [`transaction`], [`block`],
//! [`golden_ticket`]).
//!
//! Design rules enforced here:
//!
//! - **Hashes are local.** A block's hash is recomputed from content on
//!   every decode; the wire never carries it.
//! - **Signatures exclude coordinates.** A transaction signature covers its
//!   outputs' payloads but not their chain coordinates, which only exist
//!   once a bundler seals the containing block.
//! - **Slip identity is a struct.** The spend map is keyed by
//!   [`slip::SlipKey`], never by a concatenated string.

pub mod block;
pub mod crypto;
pub mod defs;
pub mod golden_ticket;
pub mod slip;
pub mod transaction;

// Re-exports for convenience.
pub use block::{Block, BlockError};
pub use defs::{
    BlockId, Currency, Hash32, PublicKey, SignatureBytes, SlipIndex, Timestamp,
    TxOrdinal, DIFFICULTY_SCALE, EMPTY_HASH, PAYSPLIT_SCALE,
};
pub use golden_ticket::TicketSolution;
pub use slip::{Slip, SlipKey, SlipKind};
pub use transaction::{Transaction, TransactionKind};
