use crate::errors::NodeError;
use coordinator::consistency::ConsistencyLevel;
use internode_protocol::Endpoint;
use partitioner::Token;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bootstrap parameters of one cluster member.
///
/// ### Fields
/// - `cluster_name`: Gossip from nodes of another cluster is ignored.
/// - `listen`: Address this node is reachable at; it is also its identity.
/// - `seeds`: Contacted while the node knows few peers. May include `listen`.
/// - `token`: Ring position as a decimal string; a random one is picked when absent.
/// - `replication_factor`: Replicas per key.
/// - `consistency`: Acknowledgments a write waits for.
/// - `gossip_interval_ms`: Period of the gossip round timer.
/// - `write_timeout_ms`: How long a write waits for acknowledgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub cluster_name: String,
    pub listen: Endpoint,
    pub seeds: Vec<Endpoint>,
    pub token: Option<String>,
    pub replication_factor: usize,
    pub consistency: ConsistencyLevel,
    pub gossip_interval_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cluster_name: "Test Cluster".to_string(),
            listen: Endpoint::v4(127, 0, 0, 1, 7000),
            seeds: Vec::new(),
            token: None,
            replication_factor: 2,
            consistency: ConsistencyLevel::Quorum,
            gossip_interval_ms: 1000,
            write_timeout_ms: 2000,
        }
    }
}

impl NodeConfig {
    pub fn new(listen: Endpoint) -> Self {
        Self {
            listen,
            ..Self::default()
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<Endpoint>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_replication_factor(mut self, replication_factor: usize) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Parsed `token`, if one was configured.
    pub fn token(&self) -> Result<Option<Token>, NodeError> {
        self.token
            .as_deref()
            .map(str::parse::<Token>)
            .transpose()
            .map_err(NodeError::from)
    }

    /// Rejects configurations a node cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.cluster_name.is_empty() {
            return Err(NodeError::Config("cluster name must not be empty".into()));
        }
        if self.replication_factor == 0 {
            return Err(NodeError::Config("replication factor must be at least 1".into()));
        }
        if self.gossip_interval_ms == 0 {
            return Err(NodeError::Config("gossip interval must be positive".into()));
        }
        self.token()?;
        Ok(())
    }
}
