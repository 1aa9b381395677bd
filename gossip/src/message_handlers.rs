//! Reconciliation rules for the three gossip messages.
//!
//! Everything here works on a plain endpoint state map so the rules can be
//! exercised without threads or sockets. The [`Gossiper`](crate::Gossiper)
//! takes the locks and sends the results.
use crate::{
    messages::{Ack, DeltaStates, Digest, Syn},
    structures::EndpointState,
};
use internode_protocol::Endpoint;
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

/// Everything a node knows about the cluster, itself included.
pub type EndpointStateMap = HashMap<Endpoint, EndpointState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What merging remote state did to the local view of an endpoint.
pub enum Event {
    /// First time this endpoint is seen.
    NodeJoined(Endpoint),
    /// The endpoint came back with a newer generation; its old state was replaced.
    NodeRestarted(Endpoint),
    /// Some heartbeat or application state of a known endpoint moved forward.
    StateChanged(Endpoint),
}

impl Event {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Event::NodeJoined(endpoint)
            | Event::NodeRestarted(endpoint)
            | Event::StateChanged(endpoint) => *endpoint,
        }
    }
}

/// The part of the local state of `endpoint` newer than `version`.
///
/// Returns `None` when there is no record for the endpoint or nothing newer.
/// Application states are filtered one by one. The heartbeat always travels
/// with a non-empty delta because the receiver needs its generation to merge.
pub fn state_for_version_bigger_than(
    states: &EndpointStateMap,
    endpoint: &Endpoint,
    version: u64,
) -> Option<EndpointState> {
    let local = states.get(endpoint)?;
    let heartbeat = local.heartbeat_state();

    let mut delta = (heartbeat.version > version).then(|| EndpointState::new(heartbeat));

    for (key, value) in local.application_states() {
        if value.version > version {
            let base = delta.unwrap_or_else(|| EndpointState::new(heartbeat));
            delta = Some(base.with_application_state(*key, value.clone()));
        }
    }

    delta
}

/// Compares the digests of a SYN against the local view and builds the ACK.
///
/// Per digest:
/// - unknown endpoint: ask for everything (`max_version = 0`);
/// - remote generation newer: ask for everything;
/// - local generation newer: send all local state;
/// - same generation: send what is newer than the remote version, or ask for
///   what is newer than ours, or skip when both match.
///
/// Endpoints the SYN does not mention at all are sent in full.
pub fn handle_syn(syn: &Syn, states: &EndpointStateMap) -> Ack {
    let mut digests = Vec::new();
    let mut delta_states = DeltaStates::new();
    let mut mentioned = HashSet::new();

    for digest in &syn.digests {
        let endpoint = digest.endpoint;
        if !mentioned.insert(endpoint) {
            continue;
        }

        let Some(local) = states.get(&endpoint) else {
            digests.push(Digest::new(endpoint, digest.generation, 0));
            continue;
        };

        let local_generation = local.generation();
        let local_version = local.max_version();

        match digest.generation.cmp(&local_generation) {
            Ordering::Greater => digests.push(Digest::new(endpoint, digest.generation, 0)),
            Ordering::Less => {
                if let Some(delta) = state_for_version_bigger_than(states, &endpoint, 0) {
                    delta_states.insert(endpoint, delta);
                }
            }
            Ordering::Equal => match digest.max_version.cmp(&local_version) {
                Ordering::Equal => continue,
                Ordering::Less => {
                    if let Some(delta) =
                        state_for_version_bigger_than(states, &endpoint, digest.max_version)
                    {
                        delta_states.insert(endpoint, delta);
                    }
                }
                Ordering::Greater => {
                    digests.push(Digest::new(endpoint, local_generation, local_version))
                }
            },
        }
    }

    for (endpoint, state) in states {
        if !mentioned.contains(endpoint) {
            delta_states.insert(*endpoint, state.clone());
        }
    }

    Ack::new(digests, delta_states)
}

/// Collects the state asked for by the digests of an ACK.
pub fn requested_deltas(digests: &[Digest], states: &EndpointStateMap) -> DeltaStates {
    let mut delta_states = DeltaStates::new();

    for digest in digests {
        let threshold = match states.get(&digest.endpoint) {
            Some(local) if local.generation() > digest.generation => 0,
            Some(_) => digest.max_version,
            None => continue,
        };

        if let Some(delta) = state_for_version_bigger_than(states, &digest.endpoint, threshold) {
            delta_states.insert(digest.endpoint, delta);
        }
    }

    delta_states
}

/// Merges remote state into the local map and reports what changed.
///
/// State about `local` itself is never taken from peers.
pub fn apply_state_locally(
    local: Endpoint,
    states: &mut EndpointStateMap,
    delta_states: DeltaStates,
) -> Vec<Event> {
    let mut events = Vec::new();

    for (endpoint, remote) in delta_states {
        if endpoint == local {
            continue;
        }

        let event = match states.get(&endpoint) {
            None => Some((remote, Event::NodeJoined(endpoint))),
            Some(current) => match remote.generation().cmp(&current.generation()) {
                Ordering::Greater => Some((remote, Event::NodeRestarted(endpoint))),
                Ordering::Less => None,
                Ordering::Equal => {
                    let merged = merge(current, &remote);
                    (merged != *current).then_some((merged, Event::StateChanged(endpoint)))
                }
            },
        };

        if let Some((state, event)) = event {
            states.insert(endpoint, state);
            events.push(event);
        }
    }

    events
}

/// Same-generation merge: every entry keeps the higher version.
fn merge(local: &EndpointState, remote: &EndpointState) -> EndpointState {
    let mut merged = local.clone();

    if remote.heartbeat_state().version > local.heartbeat_state().version {
        merged = merged.with_heartbeat_state(remote.heartbeat_state());
    }

    for (key, value) in remote.application_states() {
        let newer = local
            .application_state(*key)
            .map_or(true, |current| value.version > current.version);
        if newer {
            merged = merged.with_application_state(*key, value.clone());
        }
    }

    merged
}
