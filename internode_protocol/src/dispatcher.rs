use crate::{messages::Message, InternodeError, Stage, Verb};
use std::{collections::HashMap, sync::Arc};

/// Handles every inbound message registered under one `(stage, verb)` pair.
pub trait VerbHandler: Send + Sync {
    fn do_verb(&self, message: Message);
}

/// Routing table from `(stage, verb)` to the handler that processes the message.
///
/// Built once while a node is being wired and shared read-only afterwards.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<(Stage, Verb), Arc<dyn VerbHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(stage, verb)`, replacing any previous one.
    pub fn register(&mut self, stage: Stage, verb: Verb, handler: Arc<dyn VerbHandler>) {
        self.handlers.insert((stage, verb), handler);
    }

    /// Builder flavour of [`Dispatcher::register`].
    pub fn with_handler(mut self, stage: Stage, verb: Verb, handler: Arc<dyn VerbHandler>) -> Self {
        self.register(stage, verb, handler);
        self
    }

    pub fn dispatch(&self, message: Message) -> Result<(), InternodeError> {
        let key = (message.header.stage, message.header.verb);
        let handler = self.handlers.get(&key).ok_or(InternodeError::NoHandler {
            stage: key.0,
            verb: key.1,
        })?;

        tracing::trace!(from = %message.header.from, verb = ?key.1, "dispatching message");
        handler.do_verb(message);
        Ok(())
    }
}
