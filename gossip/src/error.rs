use internode_protocol::{InternodeError, Verb};
use thiserror::Error;

#[derive(Debug, Error)]
/// Enum to represent the different errors that can occur during the gossip protocol.
pub enum GossipError {
    #[error("there is no endpoint state for the local endpoint")]
    NoLocalEndpointState,

    #[error("verb {0:?} is not a gossip verb")]
    UnexpectedVerb(Verb),

    #[error("payload does not match verb {0:?}")]
    PayloadMismatch(Verb),

    #[error(transparent)]
    Internode(#[from] InternodeError),
}
