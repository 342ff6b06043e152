//! # Ember node
//!
//! Ties the consensus core together and runs it: the [`gate`] serializes
//! long-lived operations, [`message`] defines the closed peer wire enum,
//! [`network`] and [`storage`] are the seams toward the transport and disk
//! collaborators, [`config`] aggregates the tunables, and [`node`] owns the
//! import surface plus the block-processing and bundling loops.

pub mod config;
pub mod gate;
pub mod message;
pub mod network;
pub mod node;
pub mod storage;

pub use config::{ConfigError, NodeConfig};
pub use gate::{ConsensusGate, OpGuard, OpKind};
pub use message::{MessageError, PeerMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
pub use network::{ChainRelay, Network, NullNetwork, PeerIndex};
pub use node::{now_ms, Node, NodeError};
pub use storage::{FsBlockStore, NodeState};
