//! Paysplit tie-break between equally ranked chain tips.

use ember_types::{defs::PAYSPLIT_SCALE, Block};

/// Stateless preference policy consulted only when two competing tips have
/// identical branch length and identical cumulative burn fee.
///
/// The verdict compares the tips' paysplit votes against where this node
/// wants the ratio to go. The case enumeration is deliberately asymmetric
/// and exhaustive in the arms below; configurations not listed express no
/// preference, and a challenger without a preference loses.
#[derive(Debug, Clone, Copy)]
pub struct Voter {
    target_paysplit: u64,
}

impl Voter {
    pub fn new(target_paysplit: u64) -> Self {
        Self { target_paysplit }
    }

    /// Does this node prefer `challenger` over the `incumbent` tip?
    pub fn prefers(&self, challenger: &Block, incumbent: &Block) -> bool {
        use std::cmp::Ordering;
        match incumbent.paysplit.cmp(&self.target_paysplit) {
            // The chain pays the solver more than we want: side with a
            // challenger voting the split down, unless the incumbent
            // already does.
            Ordering::Greater => {
                challenger.paysplit_vote == -1 && incumbent.paysplit_vote != -1
            }
            // The chain pays the solver less than we want: mirror arm.
            Ordering::Less => {
                challenger.paysplit_vote == 1 && incumbent.paysplit_vote != 1
            }
            // The ratio sits where we want it: only a hold vote against a
            // mover earns preference.
            Ordering::Equal => {
                challenger.paysplit_vote == 0 && incumbent.paysplit_vote != 0
            }
        }
    }
}

impl Default for Voter {
    fn default() -> Self {
        Self::new(PAYSPLIT_SCALE / 2)
    }
}
