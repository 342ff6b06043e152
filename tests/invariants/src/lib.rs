//! Ember Property-Based Invariant Tests
//!
//! Cross-crate checks of the properties the consensus core promises:
//! - No slip is ever spendable twice without an intervening unspend.
//! - Reorganizations are atomic: a failed wind restores ledger and index
//!   bit-for-bit.
//! - Chain selection follows the length-then-burn-fee rule exactly.
//! - The lottery's difficulty floor, monetary conservation, and winner
//!   selection are deterministic across nodes.

pub mod consensus_invariants;
pub mod economic_invariants;
pub mod harness;
