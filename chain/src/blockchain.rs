//! Longest-chain selection and reorganization.
//!
//! [`Blockchain`] owns the chain index, the slip ledger, and the tie-break
//! voter. [`Blockchain::add_block`] is the single entry point: it decides
//! whether a new block extends the tip, displaces it, or merely gets
//! indexed, and it performs the unwind/wind dance with full rollback when a
//! winning branch fails validation partway through.
//!
//! The engine is deterministic and does no networking of its own; side
//! effects toward collaborators flow through [`ChainObserver`]. Historical
//! block bodies are fetched through the async [`BlockStore`] seam, and the
//! caller is expected to hold its indexing gate across the whole call so no
//! second reorganization can interleave with a suspended one.

use {
    crate::{
        error::ChainError,
        fork_id,
        index::{ChainIndex, IndexEntry},
        store::BlockStore,
    },
    ahash::AHashMap,
    ember_ledger::SlipLedger,
    ember_lottery::{validate_solution, Voter},
    ember_types::{
        defs::{hex_id, short_id, PAYSPLIT_SCALE},
        Block, BlockId, Currency, Hash32, Transaction, TransactionKind, EMPTY_HASH,
    },
    log::{debug, info, trace, warn},
    std::sync::Arc,
};

/// Tunables for chain retention and tie-breaking.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// How many blocks stay economically live. Slips older than this are
    /// unspendable and their unspent value is reclaimed by the treasury.
    pub genesis_period: u64,
    /// Extra depth kept beyond the genesis period before index entries and
    /// stored blocks are permanently purged.
    pub fork_guard: u64,
    /// How many blocks keep their full transaction payloads in memory.
    pub callback_horizon: u64,
    /// The paysplit ratio this node votes toward when breaking ties.
    pub target_paysplit: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_period: 21_600,
            fork_guard: 16,
            callback_horizon: 100,
            target_paysplit: PAYSPLIT_SCALE / 2,
        }
    }
}

/// Collaborator callbacks emitted while the chain mutates.
pub trait ChainObserver: Send + Sync {
    /// A block joined (`lc = true`) or left (`lc = false`) the longest
    /// chain. Fired in the order the reorganization applies them.
    fn on_chain_update(&self, block: &Block, lc: bool);

    /// The chain references a block we do not hold. Fire-and-forget.
    fn request_missing_block(&self, hash: &Hash32);

    /// A candidate branch was rolled back after failing validation.
    fn on_reorg_failure(&self, hash: &Hash32);
}

/// Observer that ignores everything; used by tests and tools.
pub struct NullObserver;

impl ChainObserver for NullObserver {
    fn on_chain_update(&self, _block: &Block, _lc: bool) {}
    fn request_missing_block(&self, _hash: &Hash32) {}
    fn on_reorg_failure(&self, _hash: &Hash32) {}
}

/// What [`Blockchain::add_block`] did with a block.
#[derive(Debug, Default)]
pub struct AddBlockOutcome {
    /// The block ended up on the longest chain.
    pub longest_chain: bool,
    /// The hash was already indexed; nothing changed.
    pub duplicate: bool,
    /// Transactions from displaced blocks, handed back for re-injection
    /// into the mempool. Empty unless a reorganization succeeded.
    pub unwound_transactions: Vec<Transaction>,
}

/// Phases of the reorganization state machine, logged for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReorgStep {
    Idle,
    Validating,
    Extending,
    ComparingForks,
    Unwinding,
    Winding,
    Success,
    RolledBack,
}

/// The chain: index, ledger, voter, and the reorganization algorithm.
pub struct Blockchain {
    config: ChainConfig,
    index: ChainIndex,
    ledger: SlipLedger,
    voter: Voter,
    store: Arc<dyn BlockStore>,
    /// Recent block bodies kept in memory; older bodies are pruned and
    /// re-read from the store on demand.
    blocks: AHashMap<Hash32, Block>,
    /// Funds reclaimed from expired outputs, awaiting the next bundle.
    pending_reclaimed: Currency,
    /// Highest block id whose slips have been purged.
    last_expired: BlockId,
    step: ReorgStep,
}

impl Blockchain {
    pub fn new(config: ChainConfig, store: Arc<dyn BlockStore>) -> Self {
        let voter = Voter::new(config.target_paysplit);
        Self {
            config,
            index: ChainIndex::new(),
            ledger: SlipLedger::new(),
            voter,
            store,
            blocks: AHashMap::new(),
            pending_reclaimed: 0,
            last_expired: 0,
            step: ReorgStep::Idle,
        }
    }

    // -- Accessors --

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn index(&self) -> &ChainIndex {
        &self.index
    }

    pub fn ledger(&self) -> &SlipLedger {
        &self.ledger
    }

    /// Body of the current longest-chain tip, if its payload is resident.
    pub fn tip_block(&self) -> Option<&Block> {
        self.index.tip_hash().and_then(|h| self.blocks.get(&h))
    }

    pub fn latest_block_id(&self) -> BlockId {
        self.index.tip_entry().map(|e| e.block_id).unwrap_or(0)
    }

    pub fn latest_block_hash(&self) -> Option<Hash32> {
        self.index.tip_hash()
    }

    /// The genesis floor: origins below this are outside the live window.
    pub fn blk_limit(&self) -> BlockId {
        self.latest_block_id().saturating_sub(self.config.genesis_period)
    }

    /// Rolling digest peers use to locate the common sync point.
    pub fn fork_id(&self) -> String {
        fork_id::fork_id(&self.index)
    }

    /// Most recent block id shared with a peer advertising `peer_fork_id`.
    pub fn last_shared_block_id(&self, peer_fork_id: &str, peer_latest: BlockId) -> BlockId {
        fork_id::last_shared_block_id(&self.index, peer_fork_id, peer_latest)
    }

    /// Replace the spend map with a persisted snapshot during startup.
    pub fn restore_ledger(&mut self, ledger: SlipLedger) {
        self.ledger = ledger;
    }

    /// Funds reclaimed from expired outputs, not yet carried by a bundle.
    pub fn pending_reclaimed(&self) -> Currency {
        self.pending_reclaimed
    }

    /// Drain the funds reclaimed since the last bundle.
    pub fn take_reclaimed(&mut self) -> Currency {
        std::mem::take(&mut self.pending_reclaimed)
    }

    /// Purge the slips of every block that has aged out of the live window
    /// and accumulate their unspent value for the next bundle. Returns the
    /// newly reclaimed amount.
    pub fn reclaim_expired(&mut self) -> Currency {
        let latest = self.latest_block_id();
        if latest <= self.config.genesis_period {
            return 0;
        }
        let expiring = latest - self.config.genesis_period;
        let mut reclaimed: Currency = 0;
        while self.last_expired < expiring {
            self.last_expired += 1;
            let freed = self.ledger.purge_block(self.last_expired);
            if freed > 0 {
                info!(
                    "reclaimed {freed} motes from expired block {}",
                    self.last_expired
                );
            }
            reclaimed = reclaimed.saturating_add(freed);
        }
        self.pending_reclaimed = self.pending_reclaimed.saturating_add(reclaimed);
        reclaimed
    }

    // -- The reorg engine --

    /// Admit a block: validate it, index it, and reorganize if it wins.
    ///
    /// On a validation failure the block is discarded and nothing changes.
    /// On a sync gap the block IS indexed, a fetch request is emitted, and
    /// `Err(SyncGap)` reports the missing ancestor. On a reorganization
    /// failure every change is rolled back before the error returns; the
    /// externally observable ledger state is identical to the pre-call
    /// state.
    pub async fn add_block(
        &mut self,
        mut block: Block,
        observer: &dyn ChainObserver,
    ) -> Result<AddBlockOutcome, ChainError> {
        self.transition(ReorgStep::Validating);

        if block.hash == EMPTY_HASH {
            block.hash = block.compute_hash();
        }

        if self.index.is_hash_indexed(&block.hash) {
            debug!("block {} already indexed", short_id(&block.hash));
            self.transition(ReorgStep::Idle);
            return Ok(AddBlockOutcome {
                duplicate: true,
                ..Default::default()
            });
        }

        // Linkage against the parent entry when we hold it, then the
        // stateless checks.
        let prev_indexed = self.index.is_hash_indexed(&block.prevhash);
        let prev_fields = self
            .index
            .entry_by_hash(&block.prevhash)
            .map(|prev| (prev.block_id, prev.timestamp));
        if let Some((prev_block_id, prev_timestamp)) = prev_fields {
            if block.id != prev_block_id + 1 {
                self.transition(ReorgStep::Idle);
                return Err(ChainError::ValidationFailure(format!(
                    "block id {} does not follow parent id {}",
                    block.id, prev_block_id
                )));
            }
            if block.timestamp < prev_timestamp {
                self.transition(ReorgStep::Idle);
                return Err(ChainError::ValidationFailure(format!(
                    "block timestamp {} precedes parent timestamp {}",
                    block.timestamp, prev_timestamp
                )));
            }
        }
        if let Err(e) = block.superficial_validate(None) {
            self.transition(ReorgStep::Idle);
            return Err(ChainError::from(e));
        }

        // Index the block and persist the body before deciding anything.
        self.index.insert(IndexEntry::from_block(&block));
        self.store.save_block(&block).await?;
        let block_hash = block.hash;
        let block_prevhash = block.prevhash;
        let is_genesis_candidate = block.is_genesis_candidate();
        self.blocks.insert(block_hash, block);

        if !is_genesis_candidate && !prev_indexed {
            info!(
                "block {} references unindexed parent {}",
                short_id(&block_hash),
                short_id(&block_prevhash)
            );
            observer.request_missing_block(&block_prevhash);
            self.transition(ReorgStep::Idle);
            return Err(ChainError::SyncGap {
                hash: hex_id(&block_prevhash),
            });
        }

        let old_tip = self.index.tip_hash();

        // The first block ever received bootstraps the chain
        // unconditionally.
        let Some(old_tip) = old_tip else {
            self.transition(ReorgStep::Winding);
            let outcome = self.wind_branch(&[block_hash], &[], observer).await?;
            self.finish_longest_chain().await?;
            return Ok(outcome);
        };

        if block_prevhash == old_tip {
            // Straightforward append; no fork comparison.
            self.transition(ReorgStep::Extending);
            self.transition(ReorgStep::Winding);
            let outcome = self.wind_branch(&[block_hash], &[], observer).await?;
            self.finish_longest_chain().await?;
            return Ok(outcome);
        }

        self.transition(ReorgStep::ComparingForks);
        let Some((new_branch, old_branch)) =
            self.compare_forks(block_hash, old_tip, observer)?
        else {
            self.transition(ReorgStep::Idle);
            return Ok(AddBlockOutcome::default());
        };

        self.transition(ReorgStep::Unwinding);
        let displaced = self.unwind_chain(&old_branch, observer).await?;

        self.transition(ReorgStep::Winding);
        let outcome = self
            .wind_branch(&new_branch, &old_branch, observer)
            .await
            .map(|mut outcome| {
                outcome.unwound_transactions = displaced;
                outcome
            })?;
        self.finish_longest_chain().await?;
        Ok(outcome)
    }

    /// Walk both ancestries back to the shared ancestor and apply the
    /// replacement rule. Returns the branches tip-first, or `None` when the
    /// current chain stands.
    ///
    /// A challenger must be strictly longer with at least the incumbent's
    /// cumulative burn fee, or equally long with at least the burn fee and
    /// the voter's preference. Length alone is cheap to inflate; the burn
    /// fee requirement prices the attack.
    fn compare_forks(
        &self,
        new_tip: Hash32,
        old_tip: Hash32,
        observer: &dyn ChainObserver,
    ) -> Result<Option<(Vec<Hash32>, Vec<Hash32>)>, ChainError> {
        // New branch: from the candidate back to the first longest-chain
        // ancestor.
        let mut new_branch = Vec::new();
        let mut shared_ancestor: Option<Hash32> = None;
        let mut cursor = new_tip;
        loop {
            let Some(entry) = self.index.entry_by_hash(&cursor) else {
                observer.request_missing_block(&cursor);
                return Err(ChainError::SyncGap {
                    hash: hex_id(&cursor),
                });
            };
            new_branch.push(cursor);
            if entry.prevhash == EMPTY_HASH {
                break;
            }
            match self.index.entry_by_hash(&entry.prevhash) {
                Some(prev) if prev.is_longest_chain => {
                    shared_ancestor = Some(prev.hash);
                    break;
                }
                Some(_) => cursor = entry.prevhash,
                None => {
                    observer.request_missing_block(&entry.prevhash);
                    return Err(ChainError::SyncGap {
                        hash: hex_id(&entry.prevhash),
                    });
                }
            }
        }

        // Old branch: from the current tip back to the same ancestor.
        let mut old_branch = Vec::new();
        let mut cursor = old_tip;
        loop {
            if Some(cursor) == shared_ancestor {
                break;
            }
            let Some(entry) = self.index.entry_by_hash(&cursor) else {
                return Err(ChainError::LedgerInconsistency(format!(
                    "longest-chain block {} missing from index",
                    hex_id(&cursor)
                )));
            };
            old_branch.push(cursor);
            if entry.prevhash == EMPTY_HASH {
                break;
            }
            cursor = entry.prevhash;
        }

        let burn_fee_of = |hashes: &[Hash32]| -> u128 {
            hashes
                .iter()
                .filter_map(|h| self.index.entry_by_hash(h))
                .map(|e| e.burn_fee as u128)
                .sum()
        };
        let new_len = new_branch.len();
        let old_len = old_branch.len();
        let new_burn = burn_fee_of(&new_branch);
        let old_burn = burn_fee_of(&old_branch);

        let preferred = if new_len > old_len {
            new_burn >= old_burn
        } else if new_len == old_len && new_burn >= old_burn {
            let challenger = self.blocks.get(&new_tip);
            let incumbent = self.blocks.get(&old_tip);
            match (challenger, incumbent) {
                (Some(c), Some(i)) => self.voter.prefers(c, i),
                _ => false,
            }
        } else {
            false
        };

        debug!(
            "fork comparison: challenger len {new_len} burn {new_burn} vs \
             incumbent len {old_len} burn {old_burn}: {}",
            if preferred { "replace" } else { "keep" }
        );

        if preferred {
            Ok(Some((new_branch, old_branch)))
        } else {
            Ok(None)
        }
    }

    /// Unwind the given blocks (tip-first order) off the longest chain and
    /// return the displaced payment transactions.
    async fn unwind_chain(
        &mut self,
        branch: &[Hash32],
        observer: &dyn ChainObserver,
    ) -> Result<Vec<Transaction>, ChainError> {
        let mut displaced = Vec::new();
        for hash in branch {
            let body = self.block_body(hash).await?;
            for tx in body.transactions.iter().rev() {
                self.ledger
                    .unwind_transaction(tx)
                    .map_err(|e| ChainError::LedgerInconsistency(e.to_string()))?;
            }
            self.index.set_longest_chain(hash, false);
            let parent_is_lc = self
                .index
                .entry_by_hash(&body.prevhash)
                .map(|e| e.is_longest_chain)
                .unwrap_or(false);
            self.index
                .set_tip(parent_is_lc.then_some(body.prevhash));
            observer.on_chain_update(&body, false);
            displaced.extend(
                body.transactions
                    .iter()
                    .filter(|tx| tx.kind == TransactionKind::Normal)
                    .cloned(),
            );
        }
        Ok(displaced)
    }

    /// Wind a branch (tip-first order as stored; applied ascending). On a
    /// validation failure at any block, the already-wound prefix is unwound
    /// and `rollback` (the previously displaced chain, tip-first) is wound
    /// back in full before the error returns.
    async fn wind_branch(
        &mut self,
        branch: &[Hash32],
        rollback: &[Hash32],
        observer: &dyn ChainObserver,
    ) -> Result<AddBlockOutcome, ChainError> {
        let blk_limit = self.blk_limit();
        let mut wound: Vec<Hash32> = Vec::with_capacity(branch.len());

        for hash in branch.iter().rev() {
            match self.wind_one(hash, blk_limit, observer).await {
                Ok(()) => wound.push(*hash),
                Err(e) => {
                    warn!(
                        "winding block {} failed ({e}); rolling back",
                        short_id(hash)
                    );
                    self.transition(ReorgStep::Unwinding);
                    // Unwind what we wound, newest first.
                    for wound_hash in wound.iter().rev() {
                        let body = self.block_body(wound_hash).await?;
                        for tx in body.transactions.iter().rev() {
                            self.ledger.unwind_transaction(tx).map_err(|e| {
                                ChainError::LedgerInconsistency(e.to_string())
                            })?;
                        }
                        self.index.set_longest_chain(wound_hash, false);
                        observer.on_chain_update(&body, false);
                    }
                    // Restore the displaced chain, oldest first, without
                    // re-validating: it is the known-good prior state.
                    for old_hash in rollback.iter().rev() {
                        self.force_wind(old_hash, observer).await?;
                    }
                    let restored_tip = rollback.first().copied().or_else(|| {
                        branch
                            .last()
                            .and_then(|h| self.index.entry_by_hash(h))
                            .map(|e| e.prevhash)
                            .filter(|h| *h != EMPTY_HASH)
                    });
                    self.index.set_tip(restored_tip);
                    observer.on_reorg_failure(hash);
                    self.transition(ReorgStep::RolledBack);
                    self.transition(ReorgStep::Idle);
                    return Err(ChainError::ReorgFailure {
                        hash: hex_id(hash),
                    });
                }
            }
        }

        Ok(AddBlockOutcome {
            longest_chain: true,
            ..Default::default()
        })
    }

    /// Wind a single block: golden-ticket gate, slip validation, spends,
    /// flags, callbacks.
    async fn wind_one(
        &mut self,
        hash: &Hash32,
        blk_limit: BlockId,
        observer: &dyn ChainObserver,
    ) -> Result<(), ChainError> {
        let body = self.block_body(hash).await?;

        if let Some(ticket) = body.ticket_transaction() {
            if !body.is_genesis_candidate() {
                let prev = self.block_body(&body.prevhash).await?;
                validate_solution(&prev, ticket, self.config.genesis_period)
                    .map_err(|e| ChainError::ValidationFailure(e.to_string()))?;
            }
        }

        // TODO: validate a received block's reclaimed_funds field against a
        // locally recomputed reclamation before relying on it.
        if !self.ledger.validate_block_inputs(&body, blk_limit) {
            return Err(ChainError::ValidationFailure(format!(
                "block {} failed slip validation",
                body.id
            )));
        }

        for tx in &body.transactions {
            self.ledger
                .wind_transaction(tx, body.id)
                .map_err(|e| ChainError::LedgerInconsistency(e.to_string()))?;
        }
        self.index.set_longest_chain(hash, true);
        self.index.set_tip(Some(*hash));
        observer.on_chain_update(&body, true);
        trace!("wound block {} ({})", body.id, short_id(hash));
        Ok(())
    }

    /// Re-apply a previously longest-chain block during rollback. No
    /// validation: the state being restored was valid when displaced.
    async fn force_wind(
        &mut self,
        hash: &Hash32,
        observer: &dyn ChainObserver,
    ) -> Result<(), ChainError> {
        let body = self.block_body(hash).await?;
        for tx in &body.transactions {
            self.ledger
                .wind_transaction(tx, body.id)
                .map_err(|e| ChainError::LedgerInconsistency(e.to_string()))?;
        }
        self.index.set_longest_chain(hash, true);
        self.index.set_tip(Some(*hash));
        observer.on_chain_update(&body, true);
        Ok(())
    }

    /// Post-wind housekeeping: payload eviction and permanent purge.
    async fn finish_longest_chain(&mut self) -> Result<(), ChainError> {
        self.transition(ReorgStep::Success);
        let latest = self.latest_block_id();

        // Evict transaction payloads past the callback horizon.
        if latest > self.config.callback_horizon {
            let horizon = latest - self.config.callback_horizon;
            for body in self.blocks.values_mut() {
                if body.id <= horizon && !body.pruned {
                    body.prune_transaction_data();
                }
            }
        }

        // Permanently purge entries beyond the fork guard.
        let guard_depth = self.config.genesis_period + self.config.fork_guard;
        if latest > guard_depth {
            let threshold = latest - guard_depth;
            for hash in self.index.purge_before(threshold) {
                self.blocks.remove(&hash);
                self.store.remove_block(&hash).await?;
            }
        }

        self.transition(ReorgStep::Idle);
        Ok(())
    }

    /// A block body, from memory if resident, else from the store.
    async fn block_body(&self, hash: &Hash32) -> Result<Block, ChainError> {
        if let Some(body) = self.blocks.get(hash) {
            if !body.pruned {
                return Ok(body.clone());
            }
        }
        match self.store.load_block(hash).await? {
            Some(body) => Ok(body),
            None => Err(ChainError::LedgerInconsistency(format!(
                "retained block {} has no stored body",
                hex_id(hash)
            ))),
        }
    }

    fn transition(&mut self, step: ReorgStep) {
        if self.step != step {
            trace!("reorg engine: {:?} -> {:?}", self.step, step);
            self.step = step;
        }
    }
}
