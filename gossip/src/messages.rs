use crate::structures::EndpointState;
use internode_protocol::Endpoint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Endpoint states keyed by the endpoint they describe.
pub type DeltaStates = HashMap<Endpoint, EndpointState>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// A `Digest` summarises what a node knows about one endpoint.
///
/// ### Fields
/// - `endpoint`: The endpoint being described.
/// - `generation`: The generation of that endpoint.
/// - `max_version`: The highest version known for that endpoint.
pub struct Digest {
    pub endpoint: Endpoint,
    pub generation: i64,
    pub max_version: u64,
}

impl Digest {
    /// Create a new `Digest` message.
    pub fn new(endpoint: Endpoint, generation: i64, max_version: u64) -> Self {
        Digest {
            endpoint,
            generation,
            max_version,
        }
    }

    /// Create a `Digest` from the locally known state of `endpoint`.
    pub fn from_endpoint_state(endpoint: Endpoint, state: &EndpointState) -> Self {
        Digest::new(endpoint, state.generation(), state.max_version())
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
/// Opens a gossip round: the sender's digests.
pub struct Syn {
    pub cluster_name: String,
    pub digests: Vec<Digest>,
}

impl Syn {
    pub fn new(cluster_name: impl Into<String>, digests: Vec<Digest>) -> Self {
        Syn {
            cluster_name: cluster_name.into(),
            digests,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
/// Answer to a [`Syn`].
///
/// ### Fields
/// - `digests`: Endpoints the responder wants newer state for, with the version it already has.
/// - `delta_states`: State the responder has and the syn sender lacks.
pub struct Ack {
    pub digests: Vec<Digest>,
    pub delta_states: DeltaStates,
}

impl Ack {
    pub fn new(digests: Vec<Digest>, delta_states: DeltaStates) -> Self {
        Ack {
            digests,
            delta_states,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
/// Closes a gossip round with the state requested in the [`Ack`].
pub struct Ack2 {
    pub delta_states: DeltaStates,
}

impl Ack2 {
    pub fn new(delta_states: DeltaStates) -> Self {
        Ack2 { delta_states }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
/// The payload of a gossip message.
/// - `Syn`: A `Syn` message.
/// - `Ack`: An `Ack` message.
/// - `Ack2`: An `Ack2` message.
pub enum Payload {
    Syn(Syn),
    Ack(Ack),
    Ack2(Ack2),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{ApplicationStateKey, HeartbeatState, VersionedValue};
    use internode_protocol::Serializable;

    #[test]
    fn ack_from_bytes_ok() {
        let endpoint = Endpoint::v4(127, 0, 0, 2, 7000);
        let state = EndpointState::new(HeartbeatState::new(5, 3))
            .with_application_state(ApplicationStateKey::Tokens, VersionedValue::new("42", 2));

        let payload = Payload::Ack(Ack::new(
            vec![Digest::new(Endpoint::v4(127, 0, 0, 3, 7000), 0, 0)],
            DeltaStates::from([(endpoint, state)]),
        ));

        let bytes = payload.as_bytes().unwrap();

        assert_eq!(Payload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn payload_is_tagged_by_type() {
        let payload = Payload::Syn(Syn::new("Test Cluster", Vec::new()));

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "SYN");
        assert_eq!(json["cluster_name"], "Test Cluster");
    }
}
