//! In-process link used to run several nodes inside one process.
use crate::{Dispatcher, Endpoint, InternodeError, Message, MessagingService};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        mpsc::{self, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
};
use tracing::{trace, warn};

#[derive(Default)]
struct Routes {
    queues: HashMap<Endpoint, Sender<Message>>,
    down: HashSet<Endpoint>,
}

/// Delivers messages between endpoints registered in the same process.
///
/// Every registered endpoint gets a delivery thread that drains its inbound
/// queue into its dispatcher, so handlers run concurrently with senders just
/// like they would behind a socket. Endpoints can be marked down, in which
/// case messages addressed to them are silently dropped.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    routes: Arc<Mutex<Routes>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `endpoint` to the network. The returned thread exits once every
    /// handle to the network is dropped.
    pub fn register(&self, endpoint: Endpoint, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel::<Message>();
        self.routes.lock().queues.insert(endpoint, tx);

        thread::spawn(move || {
            for message in rx {
                if let Err(e) = dispatcher.dispatch(message) {
                    warn!(%endpoint, error = %e, "dropping inbound message");
                }
            }
        })
    }

    /// Marks `endpoint` as down (`true`) or back up (`false`).
    pub fn set_down(&self, endpoint: Endpoint, down: bool) {
        let mut routes = self.routes.lock();
        if down {
            routes.down.insert(endpoint);
        } else {
            routes.down.remove(&endpoint);
        }
    }
}

impl MessagingService for LocalNetwork {
    fn send_one_way(&self, message: Message, to: Endpoint) -> Result<(), InternodeError> {
        let queue = {
            let routes = self.routes.lock();
            if routes.down.contains(&to) || routes.down.contains(&message.from()) {
                trace!(%to, verb = ?message.verb(), "endpoint down, dropping message");
                return Ok(());
            }
            routes
                .queues
                .get(&to)
                .cloned()
                .ok_or(InternodeError::UnknownEndpoint(to))?
        };

        // A closed queue behaves like a lost packet.
        if queue.send(message).is_err() {
            trace!(%to, "delivery thread gone, dropping message");
        }
        Ok(())
    }
}
