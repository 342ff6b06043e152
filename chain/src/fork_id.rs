//! Fork ids: compact digests peers exchange to find their common ancestor.
//!
//! A fork id samples one byte of the longest-chain hash at geometrically
//! spaced depths behind the tip. Two peers comparing fork ids can bound
//! their last shared block without shipping hash lists: the shallowest depth
//! whose sample matches is a block both chains contain.

use {
    crate::index::ChainIndex,
    ember_types::BlockId,
};

/// Depths behind the tip that a fork id samples, shallowest first.
pub const FORK_ID_DEPTHS: [u64; 16] = [
    0, 1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1_024, 2_048, 4_096, 8_192, 16_384,
];

/// Build the fork id for the current longest chain: one sampled byte per
/// reachable depth, hex-encoded. Shorter chains produce shorter ids.
pub fn fork_id(index: &ChainIndex) -> String {
    let Some(tip) = index.tip_entry() else {
        return String::new();
    };
    let latest = tip.block_id;
    let mut bytes = Vec::with_capacity(FORK_ID_DEPTHS.len());
    for depth in FORK_ID_DEPTHS {
        let Some(block_id) = latest.checked_sub(depth) else {
            break;
        };
        match index.longest_chain_hash_at(block_id) {
            Some(hash) => bytes.push(hash[0]),
            None => break,
        }
    }
    hex::encode(bytes)
}

/// Locate the most recent block we share with a peer, given the fork id the
/// peer computed at `peer_latest`.
///
/// Samples are compared shallowest first; the first depth where the peer's
/// byte matches our longest-chain sample bounds the shared history. Returns
/// 0 when nothing matches (full resync from genesis).
pub fn last_shared_block_id(
    index: &ChainIndex,
    peer_fork_id: &str,
    peer_latest: BlockId,
) -> BlockId {
    let Ok(peer_bytes) = hex::decode(peer_fork_id) else {
        return 0;
    };
    for (i, depth) in FORK_ID_DEPTHS.iter().enumerate() {
        let Some(&peer_byte) = peer_bytes.get(i) else {
            break;
        };
        let Some(block_id) = peer_latest.checked_sub(*depth) else {
            break;
        };
        if let Some(hash) = index.longest_chain_hash_at(block_id) {
            if hash[0] == peer_byte {
                return block_id;
            }
        }
    }
    0
}
