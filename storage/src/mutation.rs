use crate::StorageEngine;
use internode_protocol::{
    Endpoint, Message, MessagingService, Serializable, Stage, Verb, VerbHandler,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A single-row write sent by a coordinator to each replica.
///
/// ### Fields
/// - `id`: Identifies the write; the replica echoes it in its [`WriteResponse`].
/// - `table`, `key`, `value`: The row to store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMutation {
    pub id: Uuid,
    pub table: String,
    pub key: String,
    pub value: String,
}

impl RowMutation {
    /// Create a new `RowMutation` with a fresh id.
    pub fn new(table: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What a replica answers to a [`RowMutation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: Uuid,
    pub from: Endpoint,
    pub success: bool,
    pub error: Option<String>,
}

impl WriteResponse {
    pub fn ok(id: Uuid, from: Endpoint) -> Self {
        Self {
            id,
            from,
            success: true,
            error: None,
        }
    }

    pub fn failed(id: Uuid, from: Endpoint, error: impl Into<String>) -> Self {
        Self {
            id,
            from,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Applies incoming mutations to the local storage and answers the coordinator.
pub struct RowMutationVerbHandler {
    local: Endpoint,
    storage: Arc<dyn StorageEngine>,
    messaging: Arc<dyn MessagingService>,
}

impl RowMutationVerbHandler {
    pub fn new(
        local: Endpoint,
        storage: Arc<dyn StorageEngine>,
        messaging: Arc<dyn MessagingService>,
    ) -> Self {
        Self {
            local,
            storage,
            messaging,
        }
    }

    fn apply(&self, mutation: &RowMutation) -> WriteResponse {
        match self
            .storage
            .insert(&mutation.table, &mutation.key, &mutation.value)
        {
            Ok(()) => WriteResponse::ok(mutation.id, self.local),
            Err(e) => WriteResponse::failed(mutation.id, self.local, e.to_string()),
        }
    }
}

impl VerbHandler for RowMutationVerbHandler {
    fn do_verb(&self, message: Message) {
        let from = message.from();
        let mutation = match RowMutation::from_bytes(&message.payload) {
            Ok(mutation) => mutation,
            Err(e) => {
                warn!(%from, error = %e, "dropping undecodable mutation");
                return;
            }
        };

        let response = self.apply(&mutation);
        debug!(
            id = %mutation.id,
            table = %mutation.table,
            key = %mutation.key,
            success = response.success,
            "applied mutation"
        );

        let sent = response.as_bytes().and_then(|payload| {
            let reply = Message::new(
                self.local,
                Stage::RequestResponse,
                Verb::MutationResponse,
                payload,
            );
            self.messaging.send_one_way(reply, from)
        });
        if let Err(e) = sent {
            warn!(to = %from, id = %mutation.id, error = %e, "could not answer mutation");
        }
    }
}
