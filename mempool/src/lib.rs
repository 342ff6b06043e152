//! # Ember mempool
//!
//! Holds pending transactions (deduplicated by signature), at most one
//! pending golden-ticket solution, and the FIFO queue of candidate blocks
//! awaiting admission to the chain. [`Mempool::try_bundle`] decides when the
//! accumulated fees beat the decayed burn fee and assembles the next block:
//! ticket transaction first, then compatible payments, then the synthesized
//! fee-capture transaction sweeping the surplus to the bundler.

pub mod mempool;

pub use mempool::{Mempool, MempoolConfig};
