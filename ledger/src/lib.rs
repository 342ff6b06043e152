//! # Ember slip ledger
//!
//! The single source of truth for spendability. Every output ("slip") created
//! on the longest chain is tracked here from the moment its origin block is
//! wound until the block falls out of the retained genesis window. The only
//! mutation points are [`SlipLedger::insert`], [`SlipLedger::spend`],
//! [`SlipLedger::unspend`], [`SlipLedger::remove`], and
//! [`SlipLedger::purge_block`]; chain reorganization drives them in pairs so
//! that winding a branch and unwinding it again restores the map exactly.

pub mod ledger;

pub use ledger::{LedgerError, SlipLedger, SlipMarker};
