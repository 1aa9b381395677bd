//! Message plumbing between cluster members.
//!
//! The rest of the workspace only sees this crate through three things:
//! the [`Endpoint`] that names a member, the [`Message`] envelope, and the
//! [`MessagingService`] one-way send primitive. Inbound messages are routed
//! by a [`Dispatcher`] keyed on `(stage, verb)`.
pub mod dispatcher;
pub mod internode_link;
pub mod local;
pub mod messages;

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use thiserror::Error;

pub use dispatcher::{Dispatcher, VerbHandler};
pub use messages::{Endpoint, Header, Message, Stage, Verb};

/// Errors raised while moving messages between nodes.
#[derive(Debug, Error)]
pub enum InternodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("no route to endpoint {0}")]
    UnknownEndpoint(Endpoint),

    #[error("no handler registered for {stage:?}/{verb:?}")]
    NoHandler { stage: Stage, verb: Verb },

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
}

/// The `Serializable` trait is used to serialize and deserialize internode protocol messages.\
/// Every payload that implements serde's traits gets it for free; the encoding is JSON.
pub trait Serializable {
    /// Serializes the message to a byte array.
    fn as_bytes(&self) -> Result<Vec<u8>, InternodeError>;

    /// Deserializes the message from a byte array.
    fn from_bytes(bytes: &[u8]) -> Result<Self, InternodeError>
    where
        Self: Sized;
}

impl<T> Serializable for T
where
    T: Serialize + DeserializeOwned,
{
    fn as_bytes(&self) -> Result<Vec<u8>, InternodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, InternodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Fire-and-forget delivery of a message to another endpoint.
///
/// Delivery is not guaranteed, and two messages sent to the same destination
/// may arrive in any order. An `Err` only means the message could not be
/// handed to the transport.
pub trait MessagingService: Send + Sync {
    fn send_one_way(&self, message: Message, to: Endpoint) -> Result<(), InternodeError>;
}
