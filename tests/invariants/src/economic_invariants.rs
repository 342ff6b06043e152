//! Economic invariants: lottery difficulty, monetary conservation, winner
//! determinism, and burn-fee behavior.

#[cfg(test)]
mod tests {
    use {
        crate::harness::*,
        ember_chain::burnfee::{self, BurnFeeConfig},
        ember_lottery::{
            create_solution, monetary, proof_satisfies_difficulty, reward_split,
            solution_hash, validate_monetary_policy, validate_solution, LotteryError,
        },
        ember_types::{
            crypto::{public_key_bytes, sign},
            defs::{DIFFICULTY_SCALE, PAYSPLIT_SCALE},
            Slip, SlipKind, Transaction, TransactionKind,
        },
        proptest::prelude::*,
    };

    fn ticket_tx(prev: &ember_types::Block, seed: u8) -> Transaction {
        let kp = keypair(seed);
        let pk = public_key_bytes(&kp);
        let solution = create_solution(prev, &kp, [seed; 32], 21_600);
        let mut tx = Transaction::new(TransactionKind::GoldenTicket, prev.timestamp + 1);
        tx.from.push(Slip::new_sentinel(pk, SlipKind::GoldenTicket));
        tx.solution = Some(solution);
        tx.sign(&kp);
        tx
    }

    // ── Difficulty floor ──

    proptest! {
        /// With difficulty zero the hash proof passes for every nonce.
        #[test]
        fn prop_zero_difficulty_always_passes(
            miner in any::<[u8; 32]>(),
            nonce in any::<[u8; 32]>(),
            target in any::<[u8; 32]>(),
        ) {
            let candidate = solution_hash(&miner, &nonce);
            prop_assert!(proof_satisfies_difficulty(&candidate, &target, 0));
        }

        /// The fractional gate never widens what the integer gate accepts.
        #[test]
        fn prop_fractional_gate_is_monotone(
            miner in any::<[u8; 32]>(),
            nonce in any::<[u8; 32]>(),
            target in any::<[u8; 32]>(),
            d_int in 0u64..4,
            frac in 0u64..DIFFICULTY_SCALE,
        ) {
            let candidate = solution_hash(&miner, &nonce);
            let base = d_int * DIFFICULTY_SCALE;
            let with_frac = base + frac;
            if proof_satisfies_difficulty(&candidate, &target, with_frac) {
                prop_assert!(proof_satisfies_difficulty(&candidate, &target, base));
            }
        }
    }

    #[test]
    fn test_zero_difficulty_still_checks_signature() {
        let kp = keypair(11);
        let mut prev = genesis(&kp, 1_000);
        prev.difficulty = 0;
        prev.seal(1);

        let mut tx = ticket_tx(&prev, 12);
        // Corrupt the miner's signature on the solution itself.
        tx.solution.as_mut().unwrap().signature[0] ^= 0x01;
        // Keep the outer transaction signature consistent so only the
        // solution check can fail.
        let outer = keypair(12);
        tx.sign(&outer);
        assert_eq!(
            validate_solution(&prev, &tx, 21_600),
            Err(LotteryError::BadSignature)
        );
    }

    // ── Monetary conservation ──

    #[test]
    fn test_first_solvable_block_conserves_shares() {
        let kp = keypair(13);
        // The first possible solvable block: its target's prevhash is empty.
        let prev = genesis(&kp, 5_000);
        assert!(prev.is_genesis_candidate());

        let tx = ticket_tx(&prev, 14);
        let solution = tx.solution.as_ref().unwrap();

        // Independent recomputation must equal the embedded values.
        assert_eq!(validate_monetary_policy(&prev, solution, 21_600), Ok(()));
        let (_, coinbase) = monetary::calculate_monetary_policy(&prev, 21_600);
        let (miner, node) = reward_split(prev.total_fees(), coinbase, prev.paysplit);
        assert_eq!(solution.miner_share, miner);
        assert_eq!(solution.node_share, node);
    }

    #[test]
    fn test_tampered_shares_fail_validation() {
        let kp = keypair(15);
        let prev = genesis(&kp, 5_000);
        let mut tx = ticket_tx(&prev, 16);
        {
            let solution = tx.solution.as_mut().unwrap();
            solution.node_share += 1;
            // Re-sign the solution so only the monetary check can object.
            let miner_kp = keypair(16);
            solution.signature = sign(&miner_kp, &solution.signing_bytes());
        }
        let signer = keypair(16);
        tx.sign(&signer);
        assert!(matches!(
            validate_solution(&prev, &tx, 21_600),
            Err(LotteryError::ShareMismatch { .. })
        ));
    }

    proptest! {
        /// Shares conserve exactly while the paysplit stays within scale;
        /// beyond scale the node share clamps to zero.
        #[test]
        fn prop_reward_split_conservation(
            fees in 0u64..1_000_000_000,
            coinbase in 0u64..1_000_000_000,
            paysplit in 0u64..PAYSPLIT_SCALE * 2,
        ) {
            let (miner, node) = reward_split(fees, coinbase, paysplit);
            let total = fees + coinbase;
            if paysplit <= PAYSPLIT_SCALE {
                prop_assert_eq!(miner + node, total);
            } else {
                prop_assert_eq!(node, 0);
                prop_assert!(miner >= total);
            }
        }

        /// The treasury roll-forward never creates value out of thin air.
        #[test]
        fn prop_monetary_policy_bounded(
            treasury in 0u64..u32::MAX as u64,
            reclaimed in 0u64..u32::MAX as u64,
            coinbase in 0u64..u32::MAX as u64,
            period in 1u64..100_000,
        ) {
            let mut prev = ember_types::Block::new();
            prev.treasury = treasury;
            prev.reclaimed_funds = reclaimed;
            prev.coinbase = coinbase;
            let (next_treasury, next_coinbase) =
                monetary::calculate_monetary_policy(&prev, period);
            prop_assert!(next_treasury <= treasury + reclaimed);
            prop_assert!(next_coinbase <= next_treasury);
        }
    }

    // ── Winner selection ──

    proptest! {
        /// The winner index is a pure function of the signature, bounded by
        /// the contender count.
        #[test]
        fn prop_winner_index_deterministic_and_bounded(
            sig in any::<[u8; 32]>(),
            n in 1usize..100,
        ) {
            let mut signature = [0u8; 64];
            signature[..32].copy_from_slice(&sig);
            signature[32..].copy_from_slice(&sig);
            let a = monetary::winner_index(&signature, n);
            let b = monetary::winner_index(&signature, n);
            prop_assert_eq!(a, b);
            prop_assert!(a < n);
        }
    }

    #[test]
    fn test_winners_recomputable_across_nodes() {
        let kp = keypair(17);
        let mut prev = genesis(&kp, 9_000);
        prev.transactions.push(funding_tx(&keypair(18), 400, 100_001));
        prev.transactions.push(funding_tx(&keypair(19), 300, 100_002));
        prev.seal(1);

        let tx = ticket_tx(&prev, 20);
        let solution = tx.solution.as_ref().unwrap();
        // Two independent computations agree slip for slip.
        let first = monetary::find_winners(&prev, solution);
        let second = monetary::find_winners(&prev, solution);
        assert_eq!(first, second);
        assert_eq!(first[0].address, solution.miner);
        assert_eq!(first[0].amount, solution.miner_share);
        assert_eq!(first[1].amount, solution.node_share);
    }

    // ── Burn fee ──

    proptest! {
        /// Decay is monotone in elapsed time and floors at zero.
        #[test]
        fn prop_fees_needed_monotone(
            burn_fee in 0u64..u32::MAX as u64,
            elapsed_a in 0u64..10_000_000,
            elapsed_b in 0u64..10_000_000,
            decay in 0u64..100_000,
        ) {
            let (lo, hi) = if elapsed_a <= elapsed_b {
                (elapsed_a, elapsed_b)
            } else {
                (elapsed_b, elapsed_a)
            };
            prop_assert!(
                burnfee::fees_needed(burn_fee, lo, decay)
                    >= burnfee::fees_needed(burn_fee, hi, decay)
            );
        }

        /// Readjustment always lands inside the configured clamp.
        #[test]
        fn prop_next_burn_fee_clamped(
            current in 0u64..u32::MAX as u64,
            elapsed in 0u64..10_000_000,
        ) {
            let config = BurnFeeConfig::default();
            let next = burnfee::next_burn_fee(current, elapsed, &config);
            prop_assert!(next >= config.min_burn_fee);
            prop_assert!(next <= config.max_burn_fee);
        }
    }

    proptest! {
        /// A block may be bundled exactly when the decayed burn fee has
        /// fallen to what the pending fees cover.
        #[test]
        fn prop_bundle_gated_on_fee_decay(elapsed in 0u64..20_000) {
            use ember_mempool::{Mempool, MempoolConfig};

            let mut config = MempoolConfig::default();
            config.burn_fee.decay_rate_per_ms = 1;
            let mut pool = Mempool::new(config, keypair(30));

            let mut tip = ember_types::Block::new();
            tip.id = 3;
            tip.timestamp = 100_000;
            tip.burn_fee = 10_000;
            tip.seal(5);

            pool.add_transaction(fee_payment(&keypair(31), 500, 100));
            let bundled = pool
                .try_bundle(Some(&tip), 1, 100_000 + elapsed, 0)
                .is_some();
            prop_assert_eq!(bundled, 10_000u64.saturating_sub(elapsed) <= 500);
        }
    }

    // ── End to end: a golden-ticket block admits cleanly ──

    #[tokio::test]
    async fn test_golden_ticket_block_winds() {
        use ember_chain::NullObserver;

        let kp = keypair(21);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 50_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();

        let b2 = child_with(&g, &kp, 1_000, 1_000, vec![ticket_tx(&g, 22)]);
        let outcome = chain.add_block(b2.clone(), &NullObserver).await.unwrap();
        assert!(outcome.longest_chain);
        assert_eq!(chain.latest_block_hash(), Some(b2.hash));
    }

    #[tokio::test]
    async fn test_wrong_target_ticket_block_rejected() {
        use ember_chain::{ChainError, NullObserver};

        let kp = keypair(23);
        let mut chain = fresh_chain();
        let g = genesis(&kp, 50_000);
        chain.add_block(g.clone(), &NullObserver).await.unwrap();
        let b2 = child(&g, &kp, 1_000, 1_000);
        chain.add_block(b2.clone(), &NullObserver).await.unwrap();

        // A ticket solving the grandparent cannot ride in a child of b2.
        let b3 = child_with(&b2, &kp, 1_000, 1_000, vec![ticket_tx(&g, 24)]);
        let err = chain.add_block(b3, &NullObserver).await.unwrap_err();
        assert!(matches!(err, ChainError::ReorgFailure { .. }));
        assert_eq!(chain.latest_block_hash(), Some(b2.hash));
    }
}
