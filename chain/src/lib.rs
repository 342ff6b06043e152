//! # Ember chain
//!
//! The consensus core: an ordered in-memory index of every tracked block,
//! burn-fee pricing, fork ids for cheap sync negotiation, and the
//! reorganization engine that decides which chain is canonical.
//!
//! Chain selection is NOT heaviest-hash-power. A challenger branch replaces
//! the incumbent only when it is strictly longer AND has paid at least as
//! much cumulative burn fee, or when an exact length-and-fee tie is broken
//! by the paysplit [`ember_lottery::Voter`]. Reorganizations are atomic:
//! a branch that fails slip validation partway through winding is fully
//! rolled back and the previous chain restored before control returns.

pub mod blockchain;
pub mod burnfee;
pub mod error;
pub mod fork_id;
pub mod index;
pub mod store;

pub use blockchain::{
    AddBlockOutcome, Blockchain, ChainConfig, ChainObserver, NullObserver,
};
pub use burnfee::{fees_needed, next_burn_fee, BurnFeeConfig};
pub use error::ChainError;
pub use fork_id::{fork_id, last_shared_block_id, FORK_ID_DEPTHS};
pub use index::{ChainIndex, IndexEntry};
pub use store::{BlockStore, MemoryBlockStore, StoreError};
