//! Error taxonomy for chain operations.
//!
//! None of these are fatal to the node. Validation failures discard the
//! offending block, reorg failures roll back to the prior tip, sync gaps
//! trigger a fetch, and inconsistencies are surfaced loudly but recovered
//! by continuing on the known-good chain.

use {
    crate::store::StoreError,
    ember_types::BlockError,
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum ChainError {
    /// The block is malformed or cryptographically invalid. Discarded;
    /// callers may penalize the origin peer.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// A winning branch failed slip validation partway through winding.
    /// The ledger has been rolled back to the pre-attempt state.
    #[error("reorganization failed winding block {hash}; rolled back")]
    ReorgFailure { hash: String },

    /// A referenced ancestor is not indexed locally. A fetch request has
    /// been emitted; the block stays indexed for when the gap fills.
    #[error("ancestor {hash} not indexed; fetch requested")]
    SyncGap { hash: String },

    /// Internal state disagreed with itself (e.g. a retained block missing
    /// from the store). The node keeps running on its current tip.
    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BlockError> for ChainError {
    fn from(e: BlockError) -> Self {
        ChainError::ValidationFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
