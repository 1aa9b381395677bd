//! Quorum write coordination.
//!
//! A write is hashed to its replicas, sent to all of them at once, and
//! reported done as soon as enough of them acknowledge it.
pub mod callbacks;
pub mod consistency;
pub mod errors;

use callbacks::ResponseCallbacks;
use consistency::ConsistencyLevel;
use errors::CoordinatorError;
use internode_protocol::{Endpoint, Message, MessagingService, Serializable, Stage, Verb};
use parking_lot::RwLock;
use partitioner::TokenMetadata;
use std::{
    sync::{mpsc::RecvTimeoutError, Arc},
    thread,
    time::{Duration, Instant},
};
use storage::mutation::{RowMutation, WriteResponse};
use tracing::{debug, info, warn};

/// Coordinates writes issued on this node.
pub struct QuorumWriteCoordinator {
    local: Endpoint,
    token_metadata: Arc<RwLock<TokenMetadata>>,
    messaging: Arc<dyn MessagingService>,
    callbacks: Arc<ResponseCallbacks>,
    replication_factor: usize,
    consistency: ConsistencyLevel,
    timeout: Duration,
}

impl QuorumWriteCoordinator {
    pub fn new(
        local: Endpoint,
        token_metadata: Arc<RwLock<TokenMetadata>>,
        messaging: Arc<dyn MessagingService>,
        callbacks: Arc<ResponseCallbacks>,
    ) -> Self {
        Self {
            local,
            token_metadata,
            messaging,
            callbacks,
            replication_factor: 2,
            consistency: ConsistencyLevel::Quorum,
            timeout: Duration::from_millis(2000),
        }
    }

    pub fn with_replication_factor(mut self, replication_factor: usize) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    /// Replicas owning `key`, in ring order.
    pub fn replicas_for(&self, key: &str) -> Result<Vec<Endpoint>, CoordinatorError> {
        Ok(self
            .token_metadata
            .read()
            .endpoints_for_key(key, self.replication_factor)?)
    }

    /// Writes `value` under `key` in `table` on every replica of `key`.
    ///
    /// Returns the responses collected once the consistency level is met.
    /// Fails with `Unavailable` before sending anything when too few replicas
    /// exist, and with `QuorumNotMet` (carrying whatever arrived) when the
    /// timeout expires or enough replicas have failed that the level can no
    /// longer be reached.
    pub fn put(
        &self,
        table: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<WriteResponse>, CoordinatorError> {
        let required = self.consistency.required(self.replication_factor);
        let replicas = self.replicas_for(key)?;
        if replicas.len() < required {
            warn!(%key, required, alive = replicas.len(), "not enough replicas for write");
            return Err(CoordinatorError::Unavailable {
                required,
                alive: replicas.len(),
            });
        }

        let mutation = RowMutation::new(table, key, value);
        let message = Message::new(
            self.local,
            Stage::Mutation,
            Verb::Mutation,
            mutation.as_bytes()?,
        );

        let responses_rx = self.callbacks.register(mutation.id);
        let sent = self.send_to_replicas(&message, &replicas);
        debug!(id = %mutation.id, %key, ?replicas, sent, required, "mutation sent");

        let deadline = Instant::now() + self.timeout;
        let mut outstanding = sent;
        let mut successes = 0;
        let mut responses = Vec::with_capacity(replicas.len());

        while successes < required && successes + outstanding >= required {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match responses_rx.recv_timeout(remaining) {
                Ok(response) => {
                    outstanding = outstanding.saturating_sub(1);
                    if response.success {
                        successes += 1;
                    } else {
                        warn!(
                            id = %mutation.id,
                            replica = %response.from,
                            error = response.error.as_deref().unwrap_or("unknown"),
                            "replica failed write"
                        );
                    }
                    responses.push(response);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.callbacks.unregister(&mutation.id);

        if successes >= required {
            debug!(id = %mutation.id, successes, "write acknowledged");
            Ok(responses)
        } else {
            info!(id = %mutation.id, %key, required, successes, "write did not reach quorum");
            Err(CoordinatorError::QuorumNotMet {
                required,
                responses,
            })
        }
    }

    /// Sends `message` to every replica concurrently. Returns how many sends succeeded.
    fn send_to_replicas(&self, message: &Message, replicas: &[Endpoint]) -> usize {
        thread::scope(|scope| {
            let sends: Vec<_> = replicas
                .iter()
                .map(|replica| {
                    let message = message.clone();
                    scope.spawn(move || (*replica, self.messaging.send_one_way(message, *replica)))
                })
                .collect();

            sends
                .into_iter()
                .filter_map(|send| send.join().ok())
                .filter(|(replica, result)| match result {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(%replica, error = %e, "could not send mutation");
                        false
                    }
                })
                .count()
        })
    }
}
