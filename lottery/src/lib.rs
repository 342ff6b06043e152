//! # Ember golden-ticket lottery
//!
//! Block rewards are not mined by hash power. Each block poses a puzzle
//! against its own hash; the first node to solve it broadcasts a golden
//! ticket, and the next block carries that ticket as a transaction paying
//! out the solved block's fees plus coinbase. The split between the solver
//! and a deterministically chosen secondary recipient follows the block's
//! paysplit ratio.
//!
//! This crate is pure policy: no I/O, no chain state. [`solution`] checks
//! and constructs solutions, [`monetary`] computes treasury/coinbase
//! roll-forward and the reward split, [`voter`] breaks exact chain-selection
//! ties by paysplit preference.

pub mod monetary;
pub mod solution;
pub mod voter;

pub use monetary::{
    calculate_monetary_policy, find_winners, reward_split, validate_monetary_policy,
};
pub use solution::{
    create_solution, proof_satisfies_difficulty, solution_hash, validate_solution,
    LotteryError,
};
pub use voter::Voter;
