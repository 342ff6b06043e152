//! The node: import surface, message dispatch, and the run loops.
//!
//! All consensus state lives on one cooperative scheduler. Two polling loops
//! drive forward progress: the block-processing loop drains the mempool's
//! FIFO queue into the chain (with the `Indexing` flag held across any
//! suspension), and the strictly slower bundling loop mines lottery
//! solutions and assembles new blocks. Neither loop blocks on the other; a
//! loop that cannot acquire its flag simply defers to its next tick.

use {
    crate::{
        config::{ConfigError, NodeConfig},
        gate::{ConsensusGate, OpKind},
        message::{MessageError, PeerMessage, PROTOCOL_VERSION},
        network::{ChainRelay, Network, PeerIndex},
        storage::{
            load_node_state, load_spend_map, save_node_state, save_spend_map,
            FsBlockStore, NodeState,
        },
    },
    ahash::AHashMap,
    ember_chain::{Blockchain, BlockStore, ChainError, MemoryBlockStore},
    ember_ledger::SlipLedger,
    ember_lottery::{
        create_solution, proof_satisfies_difficulty, solution_hash, validate_monetary_policy,
    },
    ember_mempool::Mempool,
    ember_types::{
        crypto::{self, Keypair},
        defs::short_id,
        Block, BlockId, Hash32, PublicKey, TicketSolution, Timestamp, Transaction,
    },
    log::{debug, info, trace, warn},
    rand::RngCore,
    std::{
        sync::Arc,
        time::{Duration, SystemTime, UNIX_EPOCH},
    },
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("block decode failed: {0}")]
    BlockDecode(String),

    #[error("transaction decode failed: {0}")]
    TransactionDecode(String),

    #[error("block body hashes to {got}, expected {expected}")]
    HashMismatch { expected: String, got: String },

    #[error("transaction signature invalid")]
    BadTransactionSignature,
}

/// A running Ember node.
pub struct Node {
    config: NodeConfig,
    keypair: Keypair,
    public_key: PublicKey,
    chain: Blockchain,
    mempool: Mempool,
    gate: ConsensusGate,
    network: Arc<dyn Network>,
    relay: ChainRelay,
    store: Arc<dyn BlockStore>,
    /// Rollback counts per failing branch tip, for the repeated-failure
    /// warning.
    reorg_failures: AHashMap<String, u32>,
}

impl Node {
    pub fn new(config: NodeConfig, network: Arc<dyn Network>) -> Result<Self, NodeError> {
        config.validate()?;
        let keypair = config.keypair()?;
        let public_key = crypto::public_key_bytes(&keypair);
        // The mempool signs bundles with the same identity.
        let seed = keypair.secret.to_bytes();
        let bundler_keypair =
            crypto::keypair_from_seed(&seed).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let store: Arc<dyn BlockStore> = match &config.data_dir {
            Some(dir) => Arc::new(FsBlockStore::new(dir.join("blocks"))?),
            None => Arc::new(MemoryBlockStore::new()),
        };
        let mut chain = Blockchain::new(config.chain_config(), Arc::clone(&store));

        if let Some(dir) = &config.data_dir {
            if let Some(state) = load_node_state(&dir.join("state.json"))? {
                info!(
                    "resuming from block {} ({}), fork id {}",
                    state.latest_block_id, state.latest_block_hash, state.fork_id
                );
            }
            if let Some(rows) = load_spend_map(&dir.join("spends.json"))? {
                chain.restore_ledger(SlipLedger::from_snapshot(rows));
            }
        }

        let mempool = Mempool::new(config.mempool_config(), bundler_keypair);
        Ok(Self {
            config,
            keypair,
            public_key,
            chain,
            mempool,
            gate: ConsensusGate::new(),
            network: Arc::clone(&network),
            relay: ChainRelay::new(network),
            store,
            reorg_failures: AHashMap::new(),
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn address(&self) -> String {
        crypto::address(&self.public_key)
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    // -- Import surface --

    /// Admit a block body received from the wire. The body is decoded, its
    /// hash recomputed, and the result must match what the sender claimed.
    pub fn import_block(
        &mut self,
        bytes: &[u8],
        expected_hash: &Hash32,
    ) -> Result<bool, NodeError> {
        let block =
            Block::from_bytes(bytes).map_err(|e| NodeError::BlockDecode(e.to_string()))?;
        if block.hash != *expected_hash {
            return Err(NodeError::HashMismatch {
                expected: hex::encode(expected_hash),
                got: hex::encode(block.hash),
            });
        }
        Ok(self.mempool.add_block(block))
    }

    /// Admit a transaction received from the wire.
    pub fn import_transaction(&mut self, bytes: &[u8]) -> Result<bool, NodeError> {
        let tx: Transaction = bincode::deserialize(bytes)
            .map_err(|e| NodeError::TransactionDecode(e.to_string()))?;
        if !tx.verify_signature() {
            return Err(NodeError::BadTransactionSignature);
        }
        Ok(self.mempool.add_transaction(tx))
    }

    /// Admit a lottery solution received from the wire. Solutions that do
    /// not check out against the current tip are dropped quietly; the
    /// sender may simply be racing a tip change.
    pub fn import_solution(&mut self, solution: TicketSolution) -> bool {
        let Some(tip_hash) = self.chain.latest_block_hash() else {
            return false;
        };
        if let Some(tip) = self.chain.tip_block() {
            let candidate = solution_hash(&solution.miner, &solution.random_nonce);
            if !proof_satisfies_difficulty(&candidate, &tip.hash, tip.difficulty) {
                trace!("solution fails the difficulty against the current tip");
                return false;
            }
            if !crypto::verify(
                &solution.miner,
                &solution.signing_bytes(),
                &solution.signature,
            ) {
                return false;
            }
            if validate_monetary_policy(tip, &solution, self.config.genesis_period).is_err() {
                return false;
            }
        }
        self.mempool.add_solution(solution, tip_hash, false)
    }

    /// Rolling digest locating this node's chain for peers.
    pub fn return_fork_id(&self) -> String {
        self.chain.fork_id()
    }

    /// Most recent block id shared with a peer's advertised fork id.
    pub fn return_last_shared_block_id(
        &self,
        fork_id: &str,
        last_known_id: BlockId,
    ) -> BlockId {
        self.chain.last_shared_block_id(fork_id, last_known_id)
    }

    // -- Message dispatch --

    /// Handle one peer message. Matched exhaustively; a new variant is a
    /// compile error here.
    pub async fn handle_message(&mut self, peer: PeerIndex, message: PeerMessage) {
        match message {
            PeerMessage::Connect { node, version } => {
                if version != PROTOCOL_VERSION {
                    self.network.send(
                        peer,
                        &PeerMessage::ConnectDeny {
                            reason: format!(
                                "protocol version {version} unsupported (want {PROTOCOL_VERSION})"
                            ),
                        },
                    );
                    return;
                }
                debug!("peer {peer} connected as {}", crypto::address(&node));
                self.network.send(
                    peer,
                    &PeerMessage::ConnectReply {
                        node: self.public_key,
                        latest_block_id: self.chain.latest_block_id(),
                        fork_id: self.chain.fork_id(),
                    },
                );
            }
            PeerMessage::ConnectReply {
                latest_block_id,
                fork_id,
                ..
            } => {
                if latest_block_id > self.chain.latest_block_id() {
                    let shared = self.chain.last_shared_block_id(&fork_id, latest_block_id);
                    info!(
                        "peer {peer} is ahead (block {latest_block_id}, shared {shared}); requesting sync"
                    );
                    self.network.send(
                        peer,
                        &PeerMessage::BlockchainRequest {
                            fork_id: self.chain.fork_id(),
                            latest_block_id: self.chain.latest_block_id(),
                        },
                    );
                }
            }
            PeerMessage::ConnectDeny { reason } => {
                warn!("peer {peer} denied connection: {reason}");
            }
            PeerMessage::Block {
                bytes,
                expected_hash,
            } => match self.import_block(&bytes, &expected_hash) {
                Ok(true) => {}
                Ok(false) => trace!("peer {peer} re-sent a queued block"),
                Err(e) => {
                    warn!("invalid block from peer {peer}: {e}");
                    self.network.penalize_peer(peer);
                }
            },
            PeerMessage::BlockAvailable { hash, block_id } => {
                if !self.chain.index().is_hash_indexed(&hash) {
                    debug!(
                        "peer {peer} announced unknown block {} ({})",
                        block_id,
                        short_id(&hash)
                    );
                    self.network.send(peer, &PeerMessage::MissingBlock { hash });
                }
            }
            PeerMessage::MissingBlock { hash } => match self.store.load_block(&hash).await {
                Ok(Some(block)) => {
                    self.network.send(
                        peer,
                        &PeerMessage::Block {
                            bytes: block.to_bytes(),
                            expected_hash: block.hash,
                        },
                    );
                }
                Ok(None) => trace!("peer {peer} asked for a block we do not hold"),
                Err(e) => warn!("block store read failed: {e}"),
            },
            PeerMessage::Transaction { bytes } => {
                if let Err(e) = self.import_transaction(&bytes) {
                    warn!("invalid transaction from peer {peer}: {e}");
                    self.network.penalize_peer(peer);
                }
            }
            PeerMessage::GoldenTicket { solution } => {
                if !self.import_solution(solution) {
                    trace!("discarded lottery solution from peer {peer}");
                }
            }
            PeerMessage::BlockchainRequest {
                fork_id,
                latest_block_id,
            } => {
                let shared = self.return_last_shared_block_id(&fork_id, latest_block_id);
                let latest = self.chain.latest_block_id();
                // Announce what the peer is missing; it pulls the bodies.
                const MAX_ANNOUNCEMENTS: u64 = 512;
                let upto = latest.min(shared + MAX_ANNOUNCEMENTS);
                for block_id in (shared + 1)..=upto {
                    if let Some(hash) = self.chain.index().longest_chain_hash_at(block_id) {
                        self.network
                            .send(peer, &PeerMessage::BlockAvailable { hash, block_id });
                    }
                }
            }
        }
    }

    // -- Loop bodies --

    /// Drain the FIFO block queue into the chain, in strict arrival order.
    /// Skipped outright when an indexing pass is already in flight.
    pub async fn process_block_queue(&mut self) {
        let Some(_guard) = self.gate.try_acquire(OpKind::Indexing) else {
            debug!("indexing in flight; deferring queue processing");
            return;
        };
        while let Some(block) = self.mempool.pop_block() {
            let hash = block.hash;
            match self.chain.add_block(block, &self.relay).await {
                Ok(outcome) => {
                    if outcome.duplicate {
                        continue;
                    }
                    if !outcome.unwound_transactions.is_empty() {
                        self.mempool.reinject(outcome.unwound_transactions);
                    }
                }
                Err(ChainError::SyncGap { hash }) => {
                    debug!("block parked behind missing ancestor {hash}");
                }
                Err(ChainError::ReorgFailure { hash }) => {
                    let count = self.reorg_failures.entry(hash.clone()).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        warn!(
                            "branch at {hash} has now failed reorganization {count} times; \
                             still on the previous tip"
                        );
                    }
                }
                Err(ChainError::ValidationFailure(reason)) => {
                    warn!("discarded invalid block {}: {reason}", short_id(&hash));
                }
                Err(e) => warn!("block admission error: {e}"),
            }
        }
    }

    /// Reclaim funds from outputs that expired out of the live window.
    pub fn reclaim_tick(&mut self) {
        let Some(_guard) = self.gate.try_acquire(OpKind::Reclaiming) else {
            return;
        };
        self.chain.reclaim_expired();
    }

    /// Try a bounded number of lottery nonces against the current tip.
    pub fn mine_tick(&mut self) {
        let Some(_guard) = self.gate.try_acquire(OpKind::Creating) else {
            return;
        };
        let Some(tip) = self.chain.tip_block() else {
            return;
        };
        if self.mempool.has_solution_for(&tip.hash) {
            return;
        }
        let mut nonce = [0u8; 32];
        for _ in 0..self.config.mining_attempts_per_tick {
            rand::rng().fill_bytes(&mut nonce);
            let candidate = solution_hash(&self.public_key, &nonce);
            if proof_satisfies_difficulty(&candidate, &tip.hash, tip.difficulty) {
                let solution =
                    create_solution(tip, &self.keypair, nonce, self.config.genesis_period);
                let tip_hash = tip.hash;
                info!("found lottery solution for block {}", tip.id);
                self.network
                    .broadcast(&PeerMessage::GoldenTicket {
                        solution: solution.clone(),
                    });
                self.mempool.add_solution(solution, tip_hash, true);
                return;
            }
        }
    }

    /// Bundle a block when the mempool's fee condition is met.
    pub fn bundle_tick(&mut self, now: Timestamp) {
        let Some(_guard) = self.gate.try_acquire(OpKind::Bundling) else {
            debug!("bundling in flight; deferring");
            return;
        };
        let reclaimed = self.chain.pending_reclaimed();
        let tip = self.chain.tip_block().cloned();
        let peer_count = self.network.peer_count();
        if let Some(block) = self
            .mempool
            .try_bundle(tip.as_ref(), peer_count, now, reclaimed)
        {
            self.chain.take_reclaimed();
            self.network.broadcast(&PeerMessage::Block {
                bytes: block.to_bytes(),
                expected_hash: block.hash,
            });
            self.mempool.add_block(block);
        }
    }

    /// Flush resume state and the spend map.
    pub fn persist_tick(&mut self) {
        let Some(_guard) = self.gate.try_acquire(OpKind::Clearing) else {
            return;
        };
        let Some(dir) = self.config.data_dir.clone() else {
            return;
        };
        let state = NodeState {
            latest_block_id: self.chain.latest_block_id(),
            latest_block_hash: self
                .chain
                .latest_block_hash()
                .map(hex::encode)
                .unwrap_or_default(),
            latest_timestamp: self
                .chain
                .tip_block()
                .map(|b| b.timestamp)
                .unwrap_or_default(),
            fork_id: self.chain.fork_id(),
        };
        if let Err(e) = save_node_state(&dir.join("state.json"), &state) {
            warn!("failed to persist node state: {e}");
        }
        if let Err(e) = save_spend_map(&dir.join("spends.json"), &self.chain.ledger().snapshot())
        {
            warn!("failed to persist spend map: {e}");
        }
    }

    /// Run the polling loops forever.
    pub async fn run(mut self) {
        info!("node {} running", self.address());
        let mut processing =
            tokio::time::interval(Duration::from_millis(self.config.processing_interval_ms));
        let mut bundling =
            tokio::time::interval(Duration::from_millis(self.config.bundling_interval_ms));
        let mut persist =
            tokio::time::interval(Duration::from_millis(self.config.persist_interval_ms));
        loop {
            tokio::select! {
                _ = processing.tick() => {
                    self.process_block_queue().await;
                    self.reclaim_tick();
                }
                _ = bundling.tick() => {
                    self.mine_tick();
                    self.bundle_tick(now_ms());
                }
                _ = persist.tick() => {
                    self.persist_tick();
                }
            }
        }
    }
}

/// Wall clock in ms since the epoch.
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
