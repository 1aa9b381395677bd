//! One cluster member: gossip, replica storage and write coordination wired together.
pub mod config;
pub mod errors;

use config::NodeConfig;
use coordinator::{callbacks::ResponseCallbacks, QuorumWriteCoordinator};
use errors::NodeError;
use gossip::{
    structures::{ApplicationStateKey, NodeStatus},
    GossipTask, Gossiper,
};
use internode_protocol::{Dispatcher, Endpoint, MessagingService, Stage, Verb};
use parking_lot::{Mutex, RwLock};
use partitioner::{Token, TokenMetadata};
use std::sync::Arc;
use storage::{
    mutation::{RowMutationVerbHandler, WriteResponse},
    StorageEngine,
};
use tracing::info;

pub struct Node {
    config: NodeConfig,
    token: Token,
    gossiper: Arc<Gossiper>,
    coordinator: QuorumWriteCoordinator,
    storage: Arc<dyn StorageEngine>,
    dispatcher: Arc<Dispatcher>,
    gossip_task: Mutex<Option<GossipTask>>,
}

impl Node {
    /// Builds a node. Nothing is published or sent until [`Node::start`].
    ///
    /// `messaging` carries outbound traffic; inbound traffic must be fed to
    /// [`Node::dispatcher`] by whatever link the caller attaches it to.
    pub fn new(
        config: NodeConfig,
        messaging: Arc<dyn MessagingService>,
        storage: Arc<dyn StorageEngine>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let token = match config.token()? {
            Some(token) => token,
            None => Token::random(&mut rand::thread_rng()),
        };
        let local = config.listen;

        let token_metadata = Arc::new(RwLock::new(TokenMetadata::new()));
        let gossiper = Arc::new(
            Gossiper::new(
                local,
                config.cluster_name.clone(),
                messaging.clone(),
                token_metadata.clone(),
            )
            .with_seeds(config.seeds.clone()),
        );

        let callbacks = Arc::new(ResponseCallbacks::new());
        let coordinator =
            QuorumWriteCoordinator::new(local, token_metadata, messaging.clone(), callbacks.clone())
                .with_replication_factor(config.replication_factor)
                .with_consistency(config.consistency)
                .with_timeout(config.write_timeout());

        let mut dispatcher = Dispatcher::new();
        gossiper.register_verb_handlers(&mut dispatcher);
        dispatcher.register(
            Stage::Mutation,
            Verb::Mutation,
            Arc::new(RowMutationVerbHandler::new(local, storage.clone(), messaging)),
        );
        dispatcher.register(Stage::RequestResponse, Verb::MutationResponse, callbacks);

        Ok(Self {
            config,
            token,
            gossiper,
            coordinator,
            storage,
            dispatcher: Arc::new(dispatcher),
            gossip_task: Mutex::new(None),
        })
    }

    /// Publishes the node's state and starts gossiping.
    ///
    /// The node announces itself as `BOOT`, publishes its token and then
    /// switches to `NORMAL`. Calling it on a running node does nothing.
    pub fn start(&self) -> Result<(), NodeError> {
        let mut task = self.gossip_task.lock();
        if task.is_some() {
            return Ok(());
        }

        self.gossiper.add_local_application_state(
            ApplicationStateKey::Status,
            NodeStatus::Bootstrap.as_str(),
        )?;
        self.gossiper
            .add_local_application_state(ApplicationStateKey::Tokens, self.token.to_string())?;
        self.gossiper
            .add_local_application_state(ApplicationStateKey::Status, NodeStatus::Normal.as_str())?;

        *task = Some(self.gossiper.start(self.config.gossip_interval()));
        info!(
            endpoint = %self.endpoint(),
            token = %self.token,
            seeds = ?self.config.seeds,
            "node started"
        );
        Ok(())
    }

    /// Stops the gossip timer. Inbound messages are still handled.
    pub fn stop(&self) {
        if let Some(task) = self.gossip_task.lock().take() {
            task.stop();
            info!(endpoint = %self.endpoint(), "node stopped");
        }
    }

    /// Writes `value` under `key` in `table` with the configured consistency.
    pub fn put(&self, table: &str, key: &str, value: &str) -> Result<Vec<WriteResponse>, NodeError> {
        Ok(self.coordinator.put(table, key, value)?)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.config.listen
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current status as seen in the node's own gossip state.
    pub fn status(&self) -> NodeStatus {
        self.gossiper
            .endpoint_state(&self.endpoint())
            .and_then(|state| state.status())
            .unwrap_or_default()
    }

    pub fn gossiper(&self) -> &Arc<Gossiper> {
        &self.gossiper
    }

    pub fn coordinator(&self) -> &QuorumWriteCoordinator {
        &self.coordinator
    }

    pub fn storage(&self) -> &Arc<dyn StorageEngine> {
        &self.storage
    }

    /// Routes inbound messages to this node's handlers.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use internode_protocol::local::LocalNetwork;
    use std::time::Duration;
    use storage::MemoryStorageEngine;

    fn node(network: &LocalNetwork, config: NodeConfig) -> Node {
        let node = Node::new(
            config,
            Arc::new(network.clone()),
            Arc::new(MemoryStorageEngine::new()),
        )
        .unwrap();
        network.register(node.endpoint(), node.dispatcher());
        node
    }

    #[test]
    fn test_start_publishes_status_and_token() {
        let network = LocalNetwork::new();
        let endpoint = Endpoint::v4(127, 0, 0, 1, 7000);
        let node = node(&network, NodeConfig::new(endpoint).with_token(Token::new(42)));
        assert_eq!(node.status(), NodeStatus::Bootstrap);

        node.start().unwrap();

        let state = node.gossiper().endpoint_state(&endpoint).unwrap();
        assert_eq!(node.status(), NodeStatus::Normal);
        assert_eq!(state.tokens(), Some("42"));
        let status_version = state.application_state(ApplicationStateKey::Status).unwrap().version;
        let tokens_version = state.application_state(ApplicationStateKey::Tokens).unwrap().version;
        assert!(status_version > tokens_version);
        assert_eq!(
            node.gossiper().token_metadata().read().token_of(&endpoint),
            Some(Token::new(42))
        );
        node.stop();
    }

    #[test]
    fn test_single_replica_write_is_local() {
        let network = LocalNetwork::new();
        let endpoint = Endpoint::v4(127, 0, 0, 1, 7000);
        let node = node(
            &network,
            NodeConfig::new(endpoint)
                .with_replication_factor(1)
                .with_gossip_interval(Duration::from_millis(50)),
        );
        node.start().unwrap();

        let responses = node.put("table1", "key1", "value1").unwrap();

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].from, endpoint);
        assert_eq!(node.storage().get("table1", "key1"), Some("value1".to_string()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NodeConfig::default().with_replication_factor(0);

        assert!(Node::new(
            config,
            Arc::new(LocalNetwork::new()),
            Arc::new(MemoryStorageEngine::new())
        )
        .is_err());
    }
}
