//! Consensus-layer invariants: spendability, atomic reorganization, and the
//! chain-selection rule.

#[cfg(test)]
mod tests {
    use {
        crate::harness::*,
        ember_chain::{ChainError, NullObserver},
        ember_ledger::{LedgerError, SlipLedger, SlipMarker},
        ember_types::{SlipKey, Slip},
        proptest::prelude::*,
    };

    // ── No double-spend ──

    #[test]
    fn test_spend_requires_intervening_unspend() {
        let mut ledger = SlipLedger::new();
        let key = SlipKey {
            block_id: 1,
            tx_ordinal: 1,
            slip_index: 0,
            block_hash: [1; 32],
        };
        ledger.insert(key, 100);
        ledger.spend(&key, 2).unwrap();
        assert!(matches!(
            ledger.spend(&key, 3),
            Err(LedgerError::AlreadySpent { .. })
        ));
        ledger.unspend(&key).unwrap();
        ledger.spend(&key, 3).unwrap();
    }

    proptest! {
        /// For any interleaving of spends and unspends, a spend succeeds
        /// iff the slip is currently unspent; the marker never corrupts.
        #[test]
        fn prop_spend_unspend_alternation(ops in proptest::collection::vec(any::<bool>(), 1..64)) {
            let mut ledger = SlipLedger::new();
            let key = SlipKey { block_id: 1, tx_ordinal: 1, slip_index: 0, block_hash: [7; 32] };
            ledger.insert(key, 42);
            let mut spent = false;
            for op in ops {
                if op {
                    let result = ledger.spend(&key, 9);
                    prop_assert_eq!(result.is_ok(), !spent);
                    spent = true;
                } else {
                    let result = ledger.unspend(&key);
                    prop_assert_eq!(result.is_ok(), spent);
                    spent = false;
                }
                let expected = if spent {
                    SlipMarker::Spent { block_id: 9 }
                } else {
                    SlipMarker::Unspent
                };
                prop_assert_eq!(ledger.marker(&key), Some(expected));
            }
        }
    }

    #[tokio::test]
    async fn test_double_spend_within_chain_rejected() {
        let kp = keypair(1);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 1_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let funded = g.transactions[0].to[0].clone();

        let b2 = child_with(&g, &kp, 0, 1_000, vec![spend_tx(&kp, &funded, 101_000)]);
        chain.add_block(b2.clone(), &NullObserver).await.unwrap();

        let b3 = child_with(&b2, &kp, 0, 1_000, vec![spend_tx(&kp, &funded, 102_000)]);
        let err = chain.add_block(b3, &NullObserver).await.unwrap_err();
        assert!(matches!(err, ChainError::ReorgFailure { .. }));
        assert!(!chain.ledger().is_spendable(&funded.key(), 0));
    }

    #[tokio::test]
    async fn test_same_slip_twice_in_one_block_rejected() {
        let kp = keypair(2);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 1_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let funded = g.transactions[0].to[0].clone();

        let b2 = child_with(
            &g,
            &kp,
            0,
            1_000,
            vec![
                spend_tx(&kp, &funded, 101_000),
                spend_tx(&kp, &funded, 101_001),
            ],
        );
        let err = chain.add_block(b2, &NullObserver).await.unwrap_err();
        assert!(matches!(err, ChainError::ReorgFailure { .. }));
        // The failed extension left the slip untouched.
        assert!(chain.ledger().is_spendable(&funded.key(), 0));
    }

    // ── Reorg round-trip ──

    #[tokio::test]
    async fn test_failed_reorg_restores_ledger_and_index() {
        let kp = keypair(3);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 2_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let funded = g.transactions[0].to[0].clone();

        let l2 = child_with(&g, &kp, 1_000, 1_000, vec![spend_tx(&kp, &funded, 101_000)]);
        chain.add_block(l2.clone(), &NullObserver).await.unwrap();

        let ledger_before = chain.ledger().snapshot();
        let tip_before = chain.latest_block_hash();

        // A longer, pricier challenger whose deepest block spends thin air.
        let mut phantom = Slip::new_output(ember_types::crypto::public_key_bytes(&kp), 900);
        phantom.block_id = 1;
        phantom.tx_ordinal = 77;
        phantom.block_hash = [0x66; 32];
        let n2 = child(&g, &kp, 1_000, 1_500);
        let n3 = child_with(&n2, &kp, 1_000, 1_000, vec![spend_tx(&kp, &phantom, 102_000)]);

        chain.add_block(n2.clone(), &NullObserver).await.unwrap();
        let err = chain.add_block(n3, &NullObserver).await.unwrap_err();
        assert!(matches!(err, ChainError::ReorgFailure { .. }));

        assert_eq!(chain.ledger().snapshot(), ledger_before);
        assert_eq!(chain.latest_block_hash(), tip_before);
        assert!(
            chain
                .index()
                .entry_by_hash(&l2.hash)
                .unwrap()
                .is_longest_chain
        );
    }

    #[tokio::test]
    async fn test_reorg_forward_and_back_preserves_spendability() {
        let kp = keypair(4);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 2_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let funded = g.transactions[0].to[0].clone();

        // L spends the slip; N (longer) does not; then L grows past N and
        // spends it again.
        let l2 = child_with(&g, &kp, 1_000, 1_000, vec![spend_tx(&kp, &funded, 101_000)]);
        chain.add_block(l2.clone(), &NullObserver).await.unwrap();
        assert!(!chain.ledger().is_spendable(&funded.key(), 0));

        let n2 = child(&g, &kp, 1_000, 1_500);
        let n3 = child(&n2, &kp, 1_000, 1_000);
        chain.add_block(n2.clone(), &NullObserver).await.unwrap();
        chain.add_block(n3.clone(), &NullObserver).await.unwrap();
        assert_eq!(chain.latest_block_hash(), Some(n3.hash));
        assert!(chain.ledger().is_spendable(&funded.key(), 0));

        let l3 = child(&l2, &kp, 1_000, 1_000);
        let l4 = child(&l3, &kp, 1_000, 1_000);
        chain.add_block(l3, &NullObserver).await.unwrap();
        let outcome = chain.add_block(l4.clone(), &NullObserver).await.unwrap();
        assert!(outcome.longest_chain);
        assert_eq!(chain.latest_block_hash(), Some(l4.hash));
        // Back on L, the slip is spent again.
        assert!(!chain.ledger().is_spendable(&funded.key(), 0));
    }

    // ── Idempotent import ──

    #[tokio::test]
    async fn test_idempotent_import() {
        let kp = keypair(5);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 500);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let b2 = child(&g, &kp, 0, 1_000);
        chain.add_block(b2.clone(), &NullObserver).await.unwrap();

        let entries_before = chain.index().len();
        let ledger_before = chain.ledger().snapshot();

        let outcome = chain.add_block(b2.clone(), &NullObserver).await.unwrap();
        assert!(outcome.duplicate);
        assert_eq!(chain.index().len(), entries_before);
        assert_eq!(chain.ledger().snapshot(), ledger_before);
        assert_eq!(chain.latest_block_hash(), Some(b2.hash));
    }

    // ── Chain-selection rule ──

    #[tokio::test]
    async fn test_tie_break_longer_with_sufficient_burnfee_wins() {
        let kp = keypair(6);
        let mut chain = fresh_chain();
        let a = genesis(&kp, 100);
        chain.add_block(a.clone(), &NullObserver).await.unwrap();

        // Incumbent: 3 blocks, burn fees summing 12.5 (in millimotes here).
        let l2 = child(&a, &kp, 4_500, 1_000);
        let l3 = child(&l2, &kp, 4_000, 1_000);
        let l4 = child(&l3, &kp, 4_000, 1_000);
        for b in [l2.clone(), l3.clone(), l4.clone()] {
            chain.add_block(b, &NullObserver).await.unwrap();
        }

        // Challenger: 4 blocks summing 15.0.
        let n2 = child(&a, &kp, 4_000, 1_500);
        let n3 = child(&n2, &kp, 4_000, 1_000);
        let n4 = child(&n3, &kp, 4_000, 1_000);
        let n5 = child(&n4, &kp, 3_000, 1_000);
        chain.add_block(n2.clone(), &NullObserver).await.unwrap();
        chain.add_block(n3.clone(), &NullObserver).await.unwrap();
        chain.add_block(n4.clone(), &NullObserver).await.unwrap();
        let outcome = chain.add_block(n5.clone(), &NullObserver).await.unwrap();

        assert!(outcome.longest_chain);
        assert_eq!(chain.latest_block_hash(), Some(n5.hash));
        // All three incumbent blocks were unwound.
        for h in [l2.hash, l3.hash, l4.hash] {
            assert!(!chain.index().entry_by_hash(&h).unwrap().is_longest_chain);
        }
    }

    #[tokio::test]
    async fn test_shorter_pricier_fork_rejected() {
        let kp = keypair(7);
        let mut chain = fresh_chain();
        let a = genesis(&kp, 100);
        chain.add_block(a.clone(), &NullObserver).await.unwrap();

        // Incumbent: 4 blocks summing 20.0.
        let l2 = child(&a, &kp, 5_000, 1_000);
        let l3 = child(&l2, &kp, 5_000, 1_000);
        let l4 = child(&l3, &kp, 5_000, 1_000);
        let l5 = child(&l4, &kp, 5_000, 1_000);
        for b in [l2, l3, l4, l5.clone()] {
            chain.add_block(b, &NullObserver).await.unwrap();
        }

        // Challenger: 3 blocks summing 25.0; shorter, so rejected.
        let n2 = child(&a, &kp, 9_000, 1_500);
        let n3 = child(&n2, &kp, 8_000, 1_000);
        let n4 = child(&n3, &kp, 8_000, 1_000);
        for b in [n2, n3, n4] {
            let outcome = chain.add_block(b, &NullObserver).await.unwrap();
            assert!(!outcome.longest_chain);
        }
        assert_eq!(chain.latest_block_hash(), Some(l5.hash));
    }

    #[tokio::test]
    async fn test_longer_but_cheaper_fork_rejected() {
        let kp = keypair(8);
        let mut chain = fresh_chain();
        let a = genesis(&kp, 100);
        chain.add_block(a.clone(), &NullObserver).await.unwrap();

        let l2 = child(&a, &kp, 10_000, 1_000);
        chain.add_block(l2.clone(), &NullObserver).await.unwrap();

        // Longer but with a lower cumulative burn fee.
        let n2 = child(&a, &kp, 4_000, 1_500);
        let n3 = child(&n2, &kp, 4_000, 1_000);
        chain.add_block(n2, &NullObserver).await.unwrap();
        let outcome = chain.add_block(n3, &NullObserver).await.unwrap();
        assert!(!outcome.longest_chain);
        assert_eq!(chain.latest_block_hash(), Some(l2.hash));
    }

    // ── Genesis bootstrap ──

    #[tokio::test]
    async fn test_first_block_with_empty_prevhash_accepted() {
        let kp = keypair(9);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 0);
        assert!(g.is_genesis_candidate());
        let outcome = chain.add_block(g.clone(), &NullObserver).await.unwrap();
        assert!(outcome.longest_chain);
        assert_eq!(chain.latest_block_id(), 1);
    }

    proptest! {
        /// Whatever the genesis block's consensus fields, bootstrap is
        /// unconditional.
        #[test]
        fn prop_genesis_bootstrap_unconditional(
            burn_fee in 0u64..u32::MAX as u64,
            difficulty in 0u64..1_000_000u64,
            paysplit in 0u64..10_000u64,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let kp = keypair(10);
                let mut chain = fresh_chain();
                let mut g = genesis(&kp, 100);
                g.burn_fee = burn_fee;
                g.difficulty = difficulty;
                g.paysplit = paysplit;
                g.seal(1);
                let outcome = chain.add_block(g, &NullObserver).await.unwrap();
                prop_assert!(outcome.longest_chain);
                Ok(())
            })?;
        }
    }
}
