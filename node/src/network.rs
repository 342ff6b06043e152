//! The network seam.
//!
//! Transport and session management live outside this workspace; the core
//! only needs to count peers, push messages out, and score misbehaving
//! origins. [`ChainRelay`] adapts the chain's observer callbacks onto a
//! [`Network`].

use {
    crate::message::PeerMessage,
    ember_chain::ChainObserver,
    ember_types::{defs::short_id, Block, Hash32},
    log::{debug, info, warn},
    std::sync::Arc,
};

/// Peer index assigned by the transport layer.
pub type PeerIndex = u64;

/// Outbound capability the node consumes.
pub trait Network: Send + Sync {
    /// Number of currently connected peers.
    fn peer_count(&self) -> usize;

    /// Send to every connected peer.
    fn broadcast(&self, message: &PeerMessage);

    /// Send to one peer.
    fn send(&self, peer: PeerIndex, message: &PeerMessage);

    /// Lower a peer's reliability score after it sent invalid data.
    fn penalize_peer(&self, peer: PeerIndex);
}

/// Network that drops everything; a node running with it is a lone chain.
pub struct NullNetwork;

impl Network for NullNetwork {
    fn peer_count(&self) -> usize {
        0
    }

    fn broadcast(&self, _message: &PeerMessage) {}

    fn send(&self, _peer: PeerIndex, _message: &PeerMessage) {}

    fn penalize_peer(&self, peer: PeerIndex) {
        debug!("penalty for peer {peer} ignored (no network)");
    }
}

/// Forwards chain lifecycle events to the peers.
pub struct ChainRelay {
    network: Arc<dyn Network>,
}

impl ChainRelay {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network }
    }
}

impl ChainObserver for ChainRelay {
    fn on_chain_update(&self, block: &Block, lc: bool) {
        if lc {
            self.network.broadcast(&PeerMessage::BlockAvailable {
                hash: block.hash,
                block_id: block.id,
            });
        }
        info!(
            "chain update: block {} ({}) lc={}",
            block.id,
            short_id(&block.hash),
            lc as u8
        );
    }

    fn request_missing_block(&self, hash: &Hash32) {
        self.network
            .broadcast(&PeerMessage::MissingBlock { hash: *hash });
    }

    fn on_reorg_failure(&self, hash: &Hash32) {
        warn!(
            "competing branch at {} failed validation and was rolled back",
            short_id(hash)
        );
    }
}
