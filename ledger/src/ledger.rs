//! The spend map and per-block input validation.

use {
    ahash::{AHashMap, AHashSet},
    ember_types::{
        Block, BlockId, Currency, SlipKey, SlipKind, Transaction,
    },
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Errors from spend-map mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The slip is not tracked. Either it never existed on the longest
    /// chain or its origin block has been purged.
    #[error("unknown slip at block {block_id} tx {tx_ordinal} index {slip_index}")]
    UnknownSlip {
        block_id: BlockId,
        tx_ordinal: u64,
        slip_index: u64,
    },

    /// Attempted to spend a slip that is already marked spent.
    #[error("double spend: slip at block {block_id} tx {tx_ordinal} index {slip_index} already consumed by block {spent_by}")]
    AlreadySpent {
        block_id: BlockId,
        tx_ordinal: u64,
        slip_index: u64,
        spent_by: BlockId,
    },

    /// Attempted to unspend a slip that is not marked spent.
    #[error("slip at block {block_id} tx {tx_ordinal} index {slip_index} is not spent")]
    NotSpent {
        block_id: BlockId,
        tx_ordinal: u64,
        slip_index: u64,
    },
}

fn unknown(key: &SlipKey) -> LedgerError {
    LedgerError::UnknownSlip {
        block_id: key.block_id,
        tx_ordinal: key.tx_ordinal,
        slip_index: key.slip_index,
    }
}

/// Spend state of a tracked slip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlipMarker {
    Unspent,
    /// Consumed by a transaction in the given longest-chain block.
    Spent { block_id: BlockId },
}

/// The UTXO spend map.
///
/// Keys are the composite [`SlipKey`]; values record the slip's amount (for
/// fund reclamation at the retention boundary) and its marker.
#[derive(Debug, Default, Clone)]
pub struct SlipLedger {
    map: AHashMap<SlipKey, (Currency, SlipMarker)>,
}

impl SlipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Begin tracking a freshly wound output as unspent.
    pub fn insert(&mut self, key: SlipKey, amount: Currency) {
        self.map.insert(key, (amount, SlipMarker::Unspent));
    }

    /// Stop tracking an output whose origin block was unwound.
    pub fn remove(&mut self, key: &SlipKey) {
        self.map.remove(key);
    }

    pub fn marker(&self, key: &SlipKey) -> Option<SlipMarker> {
        self.map.get(key).map(|(_, m)| *m)
    }

    /// A slip is spendable iff it is tracked, unmarked, and its origin block
    /// sits at or above the retained genesis floor.
    pub fn is_spendable(&self, key: &SlipKey, blk_limit: BlockId) -> bool {
        key.block_id >= blk_limit
            && matches!(self.marker(key), Some(SlipMarker::Unspent))
    }

    /// Mark a slip consumed by `spending_block_id`.
    pub fn spend(
        &mut self,
        key: &SlipKey,
        spending_block_id: BlockId,
    ) -> Result<(), LedgerError> {
        let entry = self.map.get_mut(key).ok_or_else(|| unknown(key))?;
        match entry.1 {
            SlipMarker::Spent { block_id } => Err(LedgerError::AlreadySpent {
                block_id: key.block_id,
                tx_ordinal: key.tx_ordinal,
                slip_index: key.slip_index,
                spent_by: block_id,
            }),
            SlipMarker::Unspent => {
                entry.1 = SlipMarker::Spent {
                    block_id: spending_block_id,
                };
                Ok(())
            }
        }
    }

    /// Reset a slip to unspent after its consuming block is unwound.
    pub fn unspend(&mut self, key: &SlipKey) -> Result<(), LedgerError> {
        let entry = self.map.get_mut(key).ok_or_else(|| unknown(key))?;
        match entry.1 {
            SlipMarker::Unspent => Err(LedgerError::NotSpent {
                block_id: key.block_id,
                tx_ordinal: key.tx_ordinal,
                slip_index: key.slip_index,
            }),
            SlipMarker::Spent { .. } => {
                entry.1 = SlipMarker::Unspent;
                Ok(())
            }
        }
    }

    /// Drop every slip created by `block_id` and return the total unspent
    /// value among them. Called when the block ages out of the retention
    /// window; the returned value is what monetary policy reclaims.
    pub fn purge_block(&mut self, block_id: BlockId) -> Currency {
        let mut reclaimed: Currency = 0;
        self.map.retain(|key, (amount, marker)| {
            if key.block_id != block_id {
                return true;
            }
            if matches!(marker, SlipMarker::Unspent) {
                reclaimed = reclaimed.saturating_add(*amount);
            }
            false
        });
        reclaimed
    }

    /// Validate every input of every transaction in `block` against the
    /// current spend map.
    ///
    /// Enforced here:
    /// - no two transactions in the block may claim the same
    ///   `(block_id, tx_ordinal, slip_index)` source;
    /// - golden-ticket and fee-capture sources sit at the shared `(0, 0, 0)`
    ///   sentinel and are exempt from that check, but at most ONE fee-capture
    ///   source may appear per block;
    /// - tracked inputs must be spendable;
    /// - inputs whose origin precedes `blk_limit` cannot be checked against
    ///   data we no longer hold and are accepted unverified.
    pub fn validate_block_inputs(&self, block: &Block, blk_limit: BlockId) -> bool {
        let mut claimed: AHashSet<(BlockId, u64, u64)> = AHashSet::new();
        let mut fee_capture_seen = false;

        for tx in &block.transactions {
            for slip in &tx.from {
                match slip.kind {
                    SlipKind::FeeCapture if slip.is_sentinel_origin() => {
                        if fee_capture_seen {
                            warn!(
                                "block {} claims a second fee-capture source",
                                block.id
                            );
                            return false;
                        }
                        fee_capture_seen = true;
                    }
                    SlipKind::GoldenTicket if slip.is_sentinel_origin() => {
                        // Exempt bucket; block-level ticket multiplicity is
                        // enforced by superficial validation.
                    }
                    _ => {
                        let coord = (slip.block_id, slip.tx_ordinal, slip.slip_index);
                        if !claimed.insert(coord) {
                            warn!(
                                "block {} claims slip ({}, {}, {}) twice",
                                block.id, coord.0, coord.1, coord.2
                            );
                            return false;
                        }
                        if slip.block_id < blk_limit {
                            debug!(
                                "block {} input predates retained window ({} < {}), accepted unverified",
                                block.id, slip.block_id, blk_limit
                            );
                            continue;
                        }
                        if !self.is_spendable(&slip.key(), blk_limit) {
                            debug!(
                                "block {} input ({}, {}, {}) is not spendable",
                                block.id, coord.0, coord.1, coord.2
                            );
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Wind one transaction: consume its tracked inputs, create its outputs.
    pub fn wind_transaction(
        &mut self,
        tx: &Transaction,
        block_id: BlockId,
    ) -> Result<(), LedgerError> {
        for slip in &tx.from {
            if slip.is_spend_tracked() && self.map.contains_key(&slip.key()) {
                self.spend(&slip.key(), block_id)?;
            }
        }
        for slip in &tx.to {
            self.insert(slip.key(), slip.amount);
        }
        Ok(())
    }

    /// Reverse [`Self::wind_transaction`].
    pub fn unwind_transaction(&mut self, tx: &Transaction) -> Result<(), LedgerError> {
        for slip in &tx.to {
            self.remove(&slip.key());
        }
        for slip in &tx.from {
            if slip.is_spend_tracked() && self.map.contains_key(&slip.key()) {
                self.unspend(&slip.key())?;
            }
        }
        Ok(())
    }

    /// Snapshot of the full spend map, sorted for deterministic comparison
    /// and persistence.
    pub fn snapshot(&self) -> Vec<(SlipKey, Currency, SlipMarker)> {
        let mut rows: Vec<_> = self
            .map
            .iter()
            .map(|(k, (amount, marker))| (*k, *amount, *marker))
            .collect();
        rows.sort_by_key(|(k, _, _)| (k.block_id, k.tx_ordinal, k.slip_index, k.block_hash));
        rows
    }

    /// Rebuild from a persisted snapshot.
    pub fn from_snapshot(rows: Vec<(SlipKey, Currency, SlipMarker)>) -> Self {
        let mut map = AHashMap::with_capacity(rows.len());
        for (key, amount, marker) in rows {
            map.insert(key, (amount, marker));
        }
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ember_types::{
            crypto::{keypair_from_seed, public_key_bytes},
            Slip, Transaction, TransactionKind,
        },
    };

    fn key(block_id: BlockId, tx: u64, idx: u64) -> SlipKey {
        SlipKey {
            block_id,
            tx_ordinal: tx,
            slip_index: idx,
            block_hash: [0xAA; 32],
        }
    }

    fn block_with_inputs(inputs: Vec<Slip>) -> Block {
        let kp = keypair_from_seed(&[1; 32]).unwrap();
        let mut tx = Transaction::new(TransactionKind::Normal, 1);
        tx.from = inputs;
        tx.sign(&kp);
        let mut block = Block::new();
        block.id = 5;
        block.transactions.push(tx);
        block
    }

    fn input(block_id: BlockId, tx: u64, idx: u64) -> Slip {
        let kp = keypair_from_seed(&[1; 32]).unwrap();
        let mut s = Slip::new_output(public_key_bytes(&kp), 100);
        s.block_id = block_id;
        s.tx_ordinal = tx;
        s.slip_index = idx;
        s.block_hash = [0xAA; 32];
        s
    }

    #[test]
    fn test_spend_unspend_roundtrip() {
        let mut ledger = SlipLedger::new();
        let k = key(1, 1, 0);
        ledger.insert(k, 100);
        assert!(ledger.is_spendable(&k, 0));

        ledger.spend(&k, 2).unwrap();
        assert!(!ledger.is_spendable(&k, 0));
        assert_eq!(ledger.marker(&k), Some(SlipMarker::Spent { block_id: 2 }));

        ledger.unspend(&k).unwrap();
        assert!(ledger.is_spendable(&k, 0));
    }

    #[test]
    fn test_double_spend_rejected() {
        let mut ledger = SlipLedger::new();
        let k = key(1, 1, 0);
        ledger.insert(k, 100);
        ledger.spend(&k, 2).unwrap();
        assert_eq!(
            ledger.spend(&k, 3),
            Err(LedgerError::AlreadySpent {
                block_id: 1,
                tx_ordinal: 1,
                slip_index: 0,
                spent_by: 2,
            })
        );
    }

    #[test]
    fn test_unspend_requires_spent() {
        let mut ledger = SlipLedger::new();
        let k = key(1, 1, 0);
        ledger.insert(k, 100);
        assert!(matches!(
            ledger.unspend(&k),
            Err(LedgerError::NotSpent { .. })
        ));
    }

    #[test]
    fn test_unknown_slip_errors() {
        let mut ledger = SlipLedger::new();
        assert!(matches!(
            ledger.spend(&key(9, 9, 9), 1),
            Err(LedgerError::UnknownSlip { .. })
        ));
    }

    #[test]
    fn test_spendability_respects_genesis_floor() {
        let mut ledger = SlipLedger::new();
        let k = key(5, 1, 0);
        ledger.insert(k, 100);
        assert!(ledger.is_spendable(&k, 5));
        assert!(!ledger.is_spendable(&k, 6));
    }

    #[test]
    fn test_purge_block_reclaims_unspent_only() {
        let mut ledger = SlipLedger::new();
        ledger.insert(key(3, 1, 0), 100);
        ledger.insert(key(3, 1, 1), 250);
        ledger.insert(key(4, 2, 0), 999);
        ledger.spend(&key(3, 1, 1), 7).unwrap();

        let reclaimed = ledger.purge_block(3);
        assert_eq!(reclaimed, 100);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.marker(&key(3, 1, 0)).is_none());
        assert!(ledger.marker(&key(4, 2, 0)).is_some());
    }

    #[test]
    fn test_validate_rejects_duplicate_source() {
        let mut ledger = SlipLedger::new();
        ledger.insert(key(1, 1, 0), 100);
        let block = block_with_inputs(vec![input(1, 1, 0), input(1, 1, 0)]);
        assert!(!ledger.validate_block_inputs(&block, 0));
    }

    #[test]
    fn test_validate_allows_sentinel_repeats_but_caps_fee_capture() {
        let kp = keypair_from_seed(&[1; 32]).unwrap();
        let pk = public_key_bytes(&kp);
        let ledger = SlipLedger::new();

        let mut block = Block::new();
        let mut gt = Transaction::new(TransactionKind::GoldenTicket, 1);
        gt.from.push(Slip::new_sentinel(pk, SlipKind::GoldenTicket));
        gt.sign(&kp);
        let mut fc = Transaction::new(TransactionKind::FeeCapture, 1);
        fc.from.push(Slip::new_sentinel(pk, SlipKind::FeeCapture));
        fc.sign(&kp);
        block.transactions.push(gt);
        block.transactions.push(fc.clone());
        assert!(ledger.validate_block_inputs(&block, 0));

        // A second fee-capture source is out.
        block.transactions.push(fc);
        assert!(!ledger.validate_block_inputs(&block, 0));
    }

    #[test]
    fn test_validate_skips_inputs_below_genesis_floor() {
        let ledger = SlipLedger::new();
        // Origin block 2 is below the floor of 10; nothing tracked, still valid.
        let block = block_with_inputs(vec![input(2, 1, 0)]);
        assert!(ledger.validate_block_inputs(&block, 10));
    }

    #[test]
    fn test_validate_rejects_untracked_input_within_window() {
        let ledger = SlipLedger::new();
        let block = block_with_inputs(vec![input(20, 1, 0)]);
        assert!(!ledger.validate_block_inputs(&block, 10));
    }

    #[test]
    fn test_wind_unwind_transaction_restores_map() {
        let kp = keypair_from_seed(&[2; 32]).unwrap();
        let pk = public_key_bytes(&kp);

        let mut ledger = SlipLedger::new();
        ledger.insert(key(1, 1, 0), 100);

        let mut tx = Transaction::new(TransactionKind::Normal, 1);
        tx.from.push(input(1, 1, 0));
        let mut out = Slip::new_output(pk, 60);
        out.block_id = 2;
        out.tx_ordinal = 2;
        out.slip_index = 0;
        out.block_hash = [0xBB; 32];
        tx.to.push(out);
        tx.sign(&kp);

        let before = ledger.snapshot();
        ledger.wind_transaction(&tx, 2).unwrap();
        assert!(!ledger.is_spendable(&key(1, 1, 0), 0));
        assert!(ledger.is_spendable(&tx.to[0].key(), 0));

        ledger.unwind_transaction(&tx).unwrap();
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut ledger = SlipLedger::new();
        ledger.insert(key(1, 1, 0), 100);
        ledger.insert(key(2, 3, 1), 50);
        ledger.spend(&key(1, 1, 0), 4).unwrap();

        let rebuilt = SlipLedger::from_snapshot(ledger.snapshot());
        assert_eq!(rebuilt.snapshot(), ledger.snapshot());
    }
}
