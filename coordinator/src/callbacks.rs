use internode_protocol::{Message, Serializable, VerbHandler};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::mpsc::{self, Receiver, Sender},
};
use storage::mutation::WriteResponse;
use tracing::{debug, warn};
use uuid::Uuid;

/// Routes mutation responses to the write waiting for them.
///
/// Each in-flight write registers its id and gets a receiver; responses for
/// ids nobody waits on anymore are dropped.
#[derive(Default)]
pub struct ResponseCallbacks {
    pending: Mutex<HashMap<Uuid, Sender<WriteResponse>>>,
}

impl ResponseCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid) -> Receiver<WriteResponse> {
        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    pub fn unregister(&self, id: &Uuid) {
        self.pending.lock().remove(id);
    }

    /// Number of writes still waiting for responses.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Hands `response` to the write it belongs to. Returns false if that write is gone.
    pub fn complete(&self, response: WriteResponse) -> bool {
        let sender = self.pending.lock().get(&response.id).cloned();
        match sender {
            Some(sender) => sender.send(response).is_ok(),
            None => {
                debug!(id = %response.id, from = %response.from, "dropping late mutation response");
                false
            }
        }
    }
}

impl VerbHandler for ResponseCallbacks {
    fn do_verb(&self, message: Message) {
        match WriteResponse::from_bytes(&message.payload) {
            Ok(response) => {
                self.complete(response);
            }
            Err(e) => warn!(from = %message.from(), error = %e, "dropping undecodable mutation response"),
        }
    }
}
