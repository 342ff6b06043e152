//! The consensus gate: one owner, explicit non-reentrant operation flags.
//!
//! Mutation of chain state is serialized by construction (one scheduler
//! task), but long-lived operations still need mutual exclusion across
//! suspension points: a reorganization that parks on a disk read must not
//! let a second reorganization start. Each operation kind acquires a guard
//! here; dropping the guard releases it. A caller that fails to acquire is
//! expected to defer to its next tick, never to block.

use {
    parking_lot::Mutex,
    std::{collections::HashSet, sync::Arc},
};

/// The operations that exclude their own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Admitting blocks to the chain (the reorg engine).
    Indexing,
    /// Reclaiming funds from expired outputs.
    Reclaiming,
    /// Bundling a new block from the mempool.
    Bundling,
    /// Flushing resume state and clearing stale data.
    Clearing,
    /// Creating a golden-ticket solution.
    Creating,
}

/// Shared gate handed to every loop that mutates consensus state.
#[derive(Clone, Default)]
pub struct ConsensusGate {
    held: Arc<Mutex<HashSet<OpKind>>>,
}

impl ConsensusGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the flag for `kind`, or `None` if an operation of that kind
    /// is already in flight.
    pub fn try_acquire(&self, kind: OpKind) -> Option<OpGuard> {
        let mut held = self.held.lock();
        if held.insert(kind) {
            Some(OpGuard {
                held: Arc::clone(&self.held),
                kind,
            })
        } else {
            None
        }
    }

    /// Whether an operation of `kind` currently holds its flag.
    pub fn is_held(&self, kind: OpKind) -> bool {
        self.held.lock().contains(&kind)
    }
}

/// Releases its operation flag on drop.
pub struct OpGuard {
    held: Arc<Mutex<HashSet<OpKind>>>,
    kind: OpKind,
}

impl OpGuard {
    pub fn kind(&self) -> OpKind {
        self.kind
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.kind);
    }
}
