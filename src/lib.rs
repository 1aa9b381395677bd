//! A small replicated key-value store.
//!
//! Nodes find each other and share their ring tokens through gossip; writes
//! go to the replicas owning the key and succeed once a quorum acknowledges
//! them. Each concern lives in its own crate, re-exported here.
pub use coordinator::{self, consistency::ConsistencyLevel, QuorumWriteCoordinator};
pub use gossip::{self, Gossiper};
pub use internode_protocol::{self, Endpoint, MessagingService};
pub use node::{self, config::NodeConfig, Node};
pub use partitioner::{self, Token, TokenMetadata};
pub use storage::{self, MemoryStorageEngine, StorageEngine};
