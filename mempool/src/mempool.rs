//! Pending state and the block-bundling decision.

use {
    ahash::AHashSet,
    ember_chain::burnfee::{self, BurnFeeConfig},
    ember_lottery::monetary,
    ember_types::{
        crypto::{self, Keypair},
        defs::{
            DIFFICULTY_VOTE_STEP, MOTES_PER_EMBER, PAYSPLIT_SCALE, PAYSPLIT_VOTE_STEP,
        },
        Block, Currency, Hash32, SignatureBytes, Slip, SlipKind, TicketSolution,
        Timestamp, Transaction, TransactionKind,
    },
    log::{debug, info, trace},
    std::collections::VecDeque,
};

/// Tunables for bundling.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    pub burn_fee: BurnFeeConfig,
    /// Cap on transactions drained into one block.
    pub max_block_transactions: usize,
    /// Retention window length, used for the coinbase denominator.
    pub genesis_period: u64,
    /// The paysplit this node votes toward when bundling.
    pub target_paysplit: u64,
    /// Burn fee of a bootstrap (genesis) block.
    pub initial_burn_fee: Currency,
    /// Treasury seeded into a bootstrap block; the full eventual supply.
    pub initial_treasury: Currency,
    /// Difficulty of a bootstrap block.
    pub initial_difficulty: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            burn_fee: BurnFeeConfig::default(),
            max_block_transactions: 2_048,
            genesis_period: 21_600,
            target_paysplit: PAYSPLIT_SCALE / 2,
            initial_burn_fee: 2 * MOTES_PER_EMBER,
            initial_treasury: 10_000_000 * MOTES_PER_EMBER,
            initial_difficulty: 0,
        }
    }
}

/// Pending transactions, one pending lottery solution, and the candidate
/// block queue.
pub struct Mempool {
    config: MempoolConfig,
    /// This node's bundling identity; signs fee-capture and ticket
    /// transactions.
    keypair: Keypair,
    pending: Vec<Transaction>,
    seen: AHashSet<SignatureBytes>,
    /// At most one solution is retained; see [`Mempool::add_solution`].
    solution: Option<(TicketSolution, bool)>,
    queue: VecDeque<Block>,
    queued_hashes: AHashSet<Hash32>,
}

impl Mempool {
    pub fn new(config: MempoolConfig, keypair: Keypair) -> Self {
        Self {
            config,
            keypair,
            pending: Vec::new(),
            seen: AHashSet::new(),
            solution: None,
            queue: VecDeque::new(),
            queued_hashes: AHashSet::new(),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    // -- Transactions --

    /// Admit a pending payment. Returns false on a duplicate signature or a
    /// transaction kind the pool does not hold directly.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        if tx.kind != TransactionKind::Normal {
            debug!("rejecting non-payment transaction from the pool");
            return false;
        }
        if !self.seen.insert(tx.signature) {
            trace!("duplicate transaction ignored");
            return false;
        }
        self.pending.push(tx);
        true
    }

    /// Hand back transactions displaced by a reorganization.
    pub fn reinject(&mut self, transactions: Vec<Transaction>) {
        for tx in transactions {
            if tx.kind == TransactionKind::Normal {
                self.add_transaction(tx);
            }
        }
    }

    // -- Golden tickets --

    /// Offer a lottery solution. At most one is retained: a solution
    /// targeting a stale tip is evicted outright, and a newer, more
    /// profitable, or self-originated solution replaces the held one when
    /// both target the same tip.
    pub fn add_solution(
        &mut self,
        solution: TicketSolution,
        tip_hash: Hash32,
        self_origin: bool,
    ) -> bool {
        if solution.target != tip_hash {
            debug!("discarding solution for a stale tip");
            return false;
        }
        let replace = match &self.solution {
            None => true,
            Some((held, held_self_origin)) => {
                held.target != tip_hash
                    || self_origin
                    || (!held_self_origin
                        && solution.miner_share.saturating_add(solution.node_share)
                            >= held.miner_share.saturating_add(held.node_share))
            }
        };
        if replace {
            self.solution = Some((solution, self_origin));
        }
        replace
    }

    /// The held solution if it still targets `tip_hash`; stale solutions
    /// are evicted as a side effect.
    fn take_solution_for(&mut self, tip_hash: Hash32) -> Option<TicketSolution> {
        match self.solution.take() {
            Some((sol, _)) if sol.target == tip_hash => Some(sol),
            Some(_) => {
                debug!("evicting solution for a stale tip");
                None
            }
            None => None,
        }
    }

    pub fn has_solution(&self) -> bool {
        self.solution.is_some()
    }

    /// Whether the held solution targets the given tip.
    pub fn has_solution_for(&self, tip_hash: &Hash32) -> bool {
        matches!(&self.solution, Some((sol, _)) if sol.target == *tip_hash)
    }

    // -- Candidate block queue --

    /// Enqueue a received or bundled block. Returns false on a duplicate
    /// hash.
    pub fn add_block(&mut self, block: Block) -> bool {
        if !self.queued_hashes.insert(block.hash) {
            debug!("block already queued");
            return false;
        }
        self.queue.push_back(block);
        true
    }

    /// Dequeue the next block in strict arrival order.
    pub fn pop_block(&mut self) -> Option<Block> {
        let block = self.queue.pop_front()?;
        self.queued_hashes.remove(&block.hash);
        Some(block)
    }

    // -- Bundling --

    /// Bundle a new block when accumulated fees beat the decayed burn fee.
    ///
    /// `tip` is the current longest-chain tip (None before bootstrap),
    /// `peer_count` the number of connected peers, `now` the wall clock in
    /// ms, and `reclaimed` the funds the chain recovered from expired
    /// outputs since the last bundle.
    ///
    /// With zero peers the content requirement is waived so a lone node can
    /// keep its chain alive; otherwise the block must carry at least one
    /// payment or a golden ticket.
    pub fn try_bundle(
        &mut self,
        tip: Option<&Block>,
        peer_count: usize,
        now: Timestamp,
        reclaimed: Currency,
    ) -> Option<Block> {
        let vote: i8 = match tip {
            Some(t) => match self.config.target_paysplit.cmp(&t.paysplit) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
            },
            None => 0,
        };

        // Select compatible payments, oldest first, up to the cap.
        let selected: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.paysplit_vote == 0 || tx.paysplit_vote == vote)
            .map(|(i, _)| i)
            .take(self.config.max_block_transactions)
            .collect();
        let fees_available: Currency = selected
            .iter()
            .fold(0u64, |acc, &i| acc.saturating_add(self.pending[i].fee()));

        let (fees_needed, elapsed) = match tip {
            Some(t) => {
                let elapsed = now.saturating_sub(t.timestamp);
                (
                    burnfee::fees_needed(
                        t.burn_fee,
                        elapsed,
                        self.config.burn_fee.decay_rate_per_ms,
                    ),
                    elapsed,
                )
            }
            None => (0, 0),
        };
        if fees_available < fees_needed {
            return None;
        }

        let has_ticket = match (tip, &self.solution) {
            (Some(t), Some((sol, _))) => sol.target == t.hash,
            _ => false,
        };
        if peer_count > 0 && selected.is_empty() && !has_ticket {
            return None;
        }
        let solution = match tip {
            Some(t) => self.take_solution_for(t.hash),
            None => None,
        };

        let creator = crypto::public_key_bytes(&self.keypair);
        let mut block = Block::new();
        block.creator = creator;
        block.timestamp = now;
        block.reclaimed_funds = reclaimed;

        let base_ordinal = match tip {
            Some(t) => {
                block.id = t.id + 1;
                block.prevhash = t.hash;
                block.burn_fee =
                    burnfee::next_burn_fee(t.burn_fee, elapsed, &self.config.burn_fee);
                block.paysplit_vote = vote;
                block.paysplit = match vote {
                    1 => (t.paysplit + PAYSPLIT_VOTE_STEP).min(PAYSPLIT_SCALE),
                    -1 => t.paysplit.saturating_sub(PAYSPLIT_VOTE_STEP),
                    _ => t.paysplit,
                };
                let ticket_vote = solution.as_ref().map(|s| s.difficulty_vote).unwrap_or(0);
                block.difficulty_vote = ticket_vote;
                block.difficulty = match ticket_vote {
                    1 => t.difficulty + DIFFICULTY_VOTE_STEP,
                    -1 => t.difficulty.saturating_sub(DIFFICULTY_VOTE_STEP),
                    _ => t.difficulty,
                };
                let (treasury, coinbase) =
                    monetary::calculate_monetary_policy(t, self.config.genesis_period);
                block.treasury = treasury;
                block.coinbase = coinbase;
                t.max_tx_ordinal() + 1
            }
            None => {
                block.id = 1;
                block.burn_fee = self.config.initial_burn_fee;
                block.difficulty = self.config.initial_difficulty;
                block.treasury = self.config.initial_treasury;
                block.coinbase = 0;
                1
            }
        };

        // Ticket transaction first: the payout slips are recomputable by
        // every node from the solution alone.
        if let (Some(solution), Some(t)) = (solution, tip) {
            let mut ticket_tx = Transaction::new(TransactionKind::GoldenTicket, now);
            ticket_tx
                .from
                .push(Slip::new_sentinel(creator, SlipKind::GoldenTicket));
            let [miner_slip, winner_slip] = monetary::find_winners(t, &solution);
            ticket_tx.to.push(miner_slip);
            ticket_tx.to.push(winner_slip);
            ticket_tx.solution = Some(solution);
            ticket_tx.sign(&self.keypair);
            block.transactions.push(ticket_tx);
        }

        // Drain the selected payments in arrival order, releasing their
        // dedup entries so a later reorganization can re-inject them.
        let mut drained = Vec::with_capacity(selected.len());
        for &i in selected.iter().rev() {
            let tx = self.pending.remove(i);
            self.seen.remove(&tx.signature);
            drained.push(tx);
        }
        drained.reverse();
        block.transactions.extend(drained);

        // Sweep any fee surplus to the bundler.
        let surplus = fees_available.saturating_sub(fees_needed);
        if surplus > 0 {
            let mut capture = Transaction::new(TransactionKind::FeeCapture, now);
            capture
                .from
                .push(Slip::new_sentinel(creator, SlipKind::FeeCapture));
            capture.to.push(Slip::new_output(creator, surplus));
            capture.sign(&self.keypair);
            block.transactions.push(capture);
        }

        block.seal(base_ordinal);
        info!(
            "bundled block {} with {} transactions ({} motes available vs {} needed)",
            block.id,
            block.transactions.len(),
            fees_available,
            fees_needed
        );
        Some(block)
    }
}
