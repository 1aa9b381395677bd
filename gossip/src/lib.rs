//! Anti-entropy gossip between cluster members.
//!
//! Every round a node sends a SYN with one digest per endpoint it knows to a
//! random live peer (and sometimes to a seed). The peer answers with an ACK
//! carrying the state the sender lacks plus digests for the state it lacks
//! itself, and the round ends with an ACK2 carrying that state. Only deltas
//! newer than the advertised versions ever travel.
pub mod error;
pub mod message_handlers;
pub mod messages;
pub mod structures;
pub mod version_generator;

use chrono::Utc;
use error::GossipError;
use internode_protocol::{
    Dispatcher, Endpoint, Message, MessagingService, Serializable, Stage, Verb, VerbHandler,
};
use message_handlers::{EndpointStateMap, Event};
use messages::{Ack, Ack2, Digest, Payload, Syn};
use parking_lot::{Mutex, RwLock};
use partitioner::{Token, TokenMetadata};
use rand::{
    rngs::StdRng,
    seq::{IteratorRandom, SliceRandom},
    Rng, RngCore, SeedableRng,
};
use std::{
    collections::BTreeSet,
    sync::{
        mpsc::{self, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use structures::{ApplicationStateKey, EndpointState, HeartbeatState, VersionedValue};
use tracing::{debug, info, trace, warn};
use version_generator::VersionGenerator;

/// Membership view of one node.
///
/// ### Fields
/// - `endpoint_state_map`: State of every endpoint known, the local one included.
/// - `live_endpoints`: Peers gossip is sent to. Never contains the local endpoint.
/// - `unreachable_endpoints`: Peers considered down. Nothing evicts endpoints
///   today, so it only weighs in the seed probability.
#[derive(Default)]
struct GossiperState {
    endpoint_state_map: EndpointStateMap,
    live_endpoints: BTreeSet<Endpoint>,
    unreachable_endpoints: BTreeSet<Endpoint>,
}

/// Gossip engine of one node.
///
/// Shared behind an `Arc` between the round timer, the inbound message
/// handlers and whoever reads membership (the write coordinator reads the
/// token metadata it maintains).
pub struct Gossiper {
    local: Endpoint,
    cluster_name: String,
    seeds: Vec<Endpoint>,
    versions: VersionGenerator,
    state: RwLock<GossiperState>,
    token_metadata: Arc<RwLock<TokenMetadata>>,
    messaging: Arc<dyn MessagingService>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl Gossiper {
    /// Create a new Gossiper knowing only itself, with the current time as generation.
    pub fn new(
        local: Endpoint,
        cluster_name: impl Into<String>,
        messaging: Arc<dyn MessagingService>,
        token_metadata: Arc<RwLock<TokenMetadata>>,
    ) -> Self {
        let versions = VersionGenerator::new();
        let heartbeat = HeartbeatState::new(Utc::now().timestamp(), versions.increment_and_get());

        let mut state = GossiperState::default();
        state
            .endpoint_state_map
            .insert(local, EndpointState::new(heartbeat));

        Self {
            local,
            cluster_name: cluster_name.into(),
            seeds: Vec::new(),
            versions,
            state: RwLock::new(state),
            token_metadata,
            messaging,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    /// Sets the seeds contacted while the node knows few or no peers.
    pub fn with_seeds(mut self, seeds: Vec<Endpoint>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Replaces the random source used for peer selection.
    pub fn with_rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn seeds(&self) -> &[Endpoint] {
        &self.seeds
    }

    pub fn token_metadata(&self) -> Arc<RwLock<TokenMetadata>> {
        self.token_metadata.clone()
    }

    /// Registers this gossiper for the three gossip verbs.
    pub fn register_verb_handlers(self: &Arc<Self>, dispatcher: &mut Dispatcher) {
        for verb in [
            Verb::GossipDigestSyn,
            Verb::GossipDigestAck,
            Verb::GossipDigestAck2,
        ] {
            dispatcher.register(Stage::Gossip, verb, self.clone());
        }
    }

    /// Snapshot of the state known for `endpoint`.
    pub fn endpoint_state(&self, endpoint: &Endpoint) -> Option<EndpointState> {
        self.state.read().endpoint_state_map.get(endpoint).cloned()
    }

    /// Snapshot of everything known, the local endpoint included.
    pub fn endpoint_state_map(&self) -> EndpointStateMap {
        self.state.read().endpoint_state_map.clone()
    }

    pub fn live_endpoints(&self) -> Vec<Endpoint> {
        self.state.read().live_endpoints.iter().copied().collect()
    }

    pub fn unreachable_endpoints(&self) -> Vec<Endpoint> {
        self.state.read().unreachable_endpoints.iter().copied().collect()
    }

    /// Bumps the local heartbeat version.
    pub fn beat(&self) -> Result<(), GossipError> {
        let mut state = self.state.write();
        let current = state
            .endpoint_state_map
            .get(&self.local)
            .ok_or(GossipError::NoLocalEndpointState)?;

        let heartbeat = current
            .heartbeat_state()
            .with_version(self.versions.increment_and_get());
        let updated = current.with_heartbeat_state(heartbeat);
        state.endpoint_state_map.insert(self.local, updated);
        Ok(())
    }

    /// Publishes a new value for one of the local application states.
    ///
    /// Reading the current state, stamping the new version, storing the
    /// result and moving the local token all happen under one write lock.
    pub fn add_local_application_state(
        &self,
        key: ApplicationStateKey,
        value: impl Into<String>,
    ) -> Result<(), GossipError> {
        let mut state = self.state.write();
        let current = state
            .endpoint_state_map
            .get(&self.local)
            .ok_or(GossipError::NoLocalEndpointState)?;

        let versioned = VersionedValue::new(value, self.versions.increment_and_get());
        let updated = current.with_application_state(key, versioned);

        if key == ApplicationStateKey::Tokens {
            self.update_token_metadata(self.local, &updated);
        }
        state.endpoint_state_map.insert(self.local, updated);
        Ok(())
    }

    /// One digest for the local endpoint followed by one per live peer, peers shuffled.
    pub fn make_digests(&self) -> Vec<Digest> {
        let (local_digest, mut peer_digests) = {
            let state = self.state.read();
            let local_digest = state
                .endpoint_state_map
                .get(&self.local)
                .map(|local| Digest::from_endpoint_state(self.local, local));
            let peer_digests: Vec<Digest> = state
                .live_endpoints
                .iter()
                .filter(|endpoint| **endpoint != self.local)
                .filter_map(|endpoint| {
                    state
                        .endpoint_state_map
                        .get(endpoint)
                        .map(|peer| Digest::from_endpoint_state(*endpoint, peer))
                })
                .collect();
            (local_digest, peer_digests)
        };

        peer_digests.shuffle(&mut *self.rng.lock());

        local_digest.into_iter().chain(peer_digests).collect()
    }

    /// One gossip round: heartbeat, then SYN to a live peer and possibly a seed.
    pub fn run_round(&self) {
        if let Err(e) = self.beat() {
            warn!(error = %e, "failed to bump local heartbeat");
            return;
        }

        let syn = Syn::new(self.cluster_name.clone(), self.make_digests());

        let gossiped_to = self.do_gossip_to_live_member(&syn);
        let gossiped_to_seed = gossiped_to.is_some_and(|to| self.seeds.contains(&to));
        let live = self.state.read().live_endpoints.len();

        if !gossiped_to_seed || live < self.seeds.len() {
            self.do_gossip_to_seed(&syn);
        }
    }

    /// Sends `syn` to one live peer picked at random. Returns the peer, if any.
    pub fn do_gossip_to_live_member(&self, syn: &Syn) -> Option<Endpoint> {
        let live = self.live_endpoints();
        let to = live.into_iter().choose(&mut *self.rng.lock())?;

        self.send(to, Verb::GossipDigestSyn, Payload::Syn(syn.clone()));
        Some(to)
    }

    /// Sends `syn` to a random seed other than this node.
    ///
    /// Always when no peer is live; otherwise with probability
    /// `candidates / (live + unreachable)`. Returns whether a SYN went out.
    pub fn do_gossip_to_seed(&self, syn: &Syn) -> bool {
        let candidates: Vec<Endpoint> = self
            .seeds
            .iter()
            .filter(|seed| **seed != self.local)
            .copied()
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let (live, unreachable) = {
            let state = self.state.read();
            (
                state.live_endpoints.len(),
                state.unreachable_endpoints.len(),
            )
        };

        let target = {
            let mut rng = self.rng.lock();
            if live > 0 {
                let probability = candidates.len() as f64 / (live + unreachable) as f64;
                if rng.gen::<f64>() > probability {
                    return false;
                }
            }
            candidates.choose(&mut *rng).copied()
        };

        match target {
            Some(seed) => {
                self.send(seed, Verb::GossipDigestSyn, Payload::Syn(syn.clone()));
                true
            }
            None => false,
        }
    }

    /// Runs [`Gossiper::run_round`] every `interval` on a background thread.
    pub fn start(self: &Arc<Self>, interval: Duration) -> GossipTask {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let gossiper = self.clone();

        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => gossiper.run_round(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        info!(endpoint = %self.local, ?interval, "gossip started");
        GossipTask {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Answers a SYN with the matching ACK.
    pub fn handle_syn(&self, from: Endpoint, syn: Syn) -> Result<(), GossipError> {
        if syn.cluster_name != self.cluster_name {
            warn!(
                %from,
                theirs = %syn.cluster_name,
                ours = %self.cluster_name,
                "ignoring SYN from another cluster"
            );
            return Ok(());
        }

        let ack = message_handlers::handle_syn(&syn, &self.state.read().endpoint_state_map);
        trace!(%from, requested = ack.digests.len(), sent = ack.delta_states.len(), "sending ACK");

        self.try_send(from, Verb::GossipDigestAck, Payload::Ack(ack))
    }

    /// Merges the state carried by an ACK and answers with the state it asked for.
    pub fn handle_ack(&self, from: Endpoint, ack: Ack) -> Result<(), GossipError> {
        self.apply_state_locally(ack.delta_states);

        let delta_states =
            message_handlers::requested_deltas(&ack.digests, &self.state.read().endpoint_state_map);
        trace!(%from, sent = delta_states.len(), "sending ACK2");

        self.try_send(from, Verb::GossipDigestAck2, Payload::Ack2(Ack2::new(delta_states)))
    }

    /// Merges the state carried by an ACK2, closing the round.
    pub fn handle_ack2(&self, from: Endpoint, ack2: Ack2) {
        trace!(%from, received = ack2.delta_states.len(), "merging ACK2");
        self.apply_state_locally(ack2.delta_states);
    }

    /// Merges `delta_states` and moves the ring while still holding the state
    /// lock, so the ring always follows the last merged TOKENS value.
    fn apply_state_locally(&self, delta_states: messages::DeltaStates) {
        if delta_states.is_empty() {
            return;
        }

        let mut state = self.state.write();
        let events = message_handlers::apply_state_locally(
            self.local,
            &mut state.endpoint_state_map,
            delta_states,
        );

        for event in events {
            let endpoint = event.endpoint();
            if state.live_endpoints.insert(endpoint) {
                state.unreachable_endpoints.remove(&endpoint);
            }

            let Some(endpoint_state) = state.endpoint_state_map.get(&endpoint) else {
                continue;
            };
            match event {
                Event::NodeJoined(_) => self.handle_new_join(endpoint, endpoint_state),
                Event::NodeRestarted(_) => {
                    info!(%endpoint, generation = endpoint_state.generation(), "node restarted");
                    self.update_token_metadata(endpoint, endpoint_state);
                }
                Event::StateChanged(_) => self.update_token_metadata(endpoint, endpoint_state),
            }
        }
    }

    fn handle_new_join(&self, endpoint: Endpoint, endpoint_state: &EndpointState) {
        self.update_token_metadata(endpoint, endpoint_state);
        info!(
            %endpoint,
            tokens = endpoint_state.tokens().unwrap_or("-"),
            "node is now part of the cluster"
        );
    }

    fn update_token_metadata(&self, endpoint: Endpoint, endpoint_state: &EndpointState) {
        let Some(tokens) = endpoint_state.tokens() else {
            return;
        };

        match tokens.parse::<Token>() {
            Ok(token) => {
                let mut metadata = self.token_metadata.write();
                if metadata.token_of(&endpoint) != Some(token) {
                    metadata.update(token, endpoint);
                    debug!(%endpoint, %token, "token metadata updated");
                }
            }
            Err(e) => warn!(%endpoint, error = %e, "ignoring unparsable TOKENS state"),
        }
    }

    fn send(&self, to: Endpoint, verb: Verb, payload: Payload) {
        if let Err(e) = self.try_send(to, verb, payload) {
            warn!(%to, ?verb, error = %e, "gossip send failed, next round retries");
        }
    }

    fn try_send(&self, to: Endpoint, verb: Verb, payload: Payload) -> Result<(), GossipError> {
        let message = Message::new(self.local, Stage::Gossip, verb, payload.as_bytes()?);
        self.messaging.send_one_way(message, to)?;
        Ok(())
    }

    fn handle_message(&self, message: Message) -> Result<(), GossipError> {
        let from = message.from();
        let verb = message.verb();

        match (verb, Payload::from_bytes(&message.payload)?) {
            (Verb::GossipDigestSyn, Payload::Syn(syn)) => self.handle_syn(from, syn),
            (Verb::GossipDigestAck, Payload::Ack(ack)) => self.handle_ack(from, ack),
            (Verb::GossipDigestAck2, Payload::Ack2(ack2)) => {
                self.handle_ack2(from, ack2);
                Ok(())
            }
            (Verb::GossipDigestSyn | Verb::GossipDigestAck | Verb::GossipDigestAck2, _) => {
                Err(GossipError::PayloadMismatch(verb))
            }
            (verb, _) => Err(GossipError::UnexpectedVerb(verb)),
        }
    }
}

impl VerbHandler for Gossiper {
    fn do_verb(&self, message: Message) {
        let from = message.from();
        if let Err(e) = self.handle_message(message) {
            warn!(%from, error = %e, "dropping gossip message");
        }
    }
}

/// Handle to the background gossip round timer.
pub struct GossipTask {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl GossipTask {
    /// Stops the timer and waits for the current round to finish.
    pub fn stop(mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GossipTask {
    fn drop(&mut self) {
        // closing the channel ends the loop
        self.stop.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use internode_protocol::InternodeError;
    use std::{collections::HashSet, sync::Barrier};

    /// Records every message instead of sending it.
    #[derive(Default)]
    struct RecordingMessaging(Mutex<Vec<(Endpoint, Message)>>);

    impl RecordingMessaging {
        fn sent(&self) -> Vec<(Endpoint, Message)> {
            self.0.lock().clone()
        }
    }

    impl MessagingService for RecordingMessaging {
        fn send_one_way(&self, message: Message, to: Endpoint) -> Result<(), InternodeError> {
            self.0.lock().push((to, message));
            Ok(())
        }
    }

    fn ep(last: u8) -> Endpoint {
        Endpoint::v4(127, 0, 0, last, 7000)
    }

    fn gossiper(local: Endpoint, messaging: Arc<RecordingMessaging>) -> Gossiper {
        Gossiper::new(
            local,
            "Test Cluster",
            messaging,
            Arc::new(RwLock::new(TokenMetadata::new())),
        )
        .with_rng(Box::new(StdRng::seed_from_u64(42)))
    }

    fn peer_state(generation: i64, version: u64, token: &str) -> EndpointState {
        EndpointState::new(HeartbeatState::new(generation, version)).with_application_state(
            ApplicationStateKey::Tokens,
            VersionedValue::new(token, version),
        )
    }

    fn decode(message: &Message) -> Payload {
        Payload::from_bytes(&message.payload).unwrap()
    }

    /// Random source whose `f64` draw is `self.0 >> 11` scaled to [0, 1) and
    /// whose index draws always pick the first element.
    struct FixedRng(u64);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    fn with_live_peers(gossiper: &Gossiper, peers: &[u8]) {
        gossiper.apply_state_locally(
            peers
                .iter()
                .map(|last| (ep(*last), peer_state(1, 1, &last.to_string())))
                .collect(),
        );
    }

    fn syn_targets(messaging: &RecordingMessaging) -> Vec<Endpoint> {
        messaging
            .sent()
            .into_iter()
            .filter(|(_, message)| message.verb() == Verb::GossipDigestSyn)
            .map(|(to, _)| to)
            .collect()
    }

    #[test]
    fn local_updates_are_versioned_and_monotonic() {
        let gossiper = gossiper(ep(1), Arc::default());
        let before = gossiper.endpoint_state(&ep(1)).unwrap().max_version();

        gossiper
            .add_local_application_state(ApplicationStateKey::Status, "NORMAL")
            .unwrap();
        gossiper.beat().unwrap();

        let state = gossiper.endpoint_state(&ep(1)).unwrap();
        let status = state.application_state(ApplicationStateKey::Status).unwrap();
        assert!(status.version > before);
        assert!(state.heartbeat_state().version > status.version);
        assert_eq!(state.max_version(), state.heartbeat_state().version);
    }

    #[test]
    fn local_tokens_update_token_metadata() {
        let gossiper = gossiper(ep(1), Arc::default());

        gossiper
            .add_local_application_state(ApplicationStateKey::Tokens, "1234")
            .unwrap();

        assert_eq!(
            gossiper.token_metadata().read().token_of(&ep(1)),
            Some(Token::new(1234))
        );
    }

    #[test]
    fn digests_are_never_duplicated() {
        let gossiper = gossiper(ep(1), Arc::default());
        gossiper.apply_state_locally(messages::DeltaStates::from([
            (ep(2), peer_state(1, 3, "2")),
            (ep(3), peer_state(1, 4, "3")),
            (ep(4), peer_state(1, 5, "4")),
        ]));

        let digests = gossiper.make_digests();

        assert_eq!(digests.len(), 4);
        assert_eq!(digests[0].endpoint, ep(1));
        let unique: HashSet<_> = digests.iter().map(|digest| digest.endpoint).collect();
        assert_eq!(unique.len(), digests.len());
    }

    #[test]
    fn self_seed_is_skipped() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone()).with_seeds(vec![ep(1)]);

        let syn = Syn::new("Test Cluster", gossiper.make_digests());

        assert!(!gossiper.do_gossip_to_seed(&syn));
        gossiper.run_round();
        assert!(messaging.sent().is_empty());
    }

    #[test]
    fn lonely_node_gossips_to_seed() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(2), messaging.clone()).with_seeds(vec![ep(1)]);

        gossiper.run_round();

        let sent = messaging.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ep(1));
        assert_eq!(sent[0].1.verb(), Verb::GossipDigestSyn);
        assert!(matches!(decode(&sent[0].1), Payload::Syn(syn) if syn.digests.len() == 1));
    }

    #[test]
    fn no_peers_and_no_seeds_is_a_no_op() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone());

        gossiper.run_round();

        assert!(messaging.sent().is_empty());
    }

    #[test]
    fn syn_from_another_cluster_is_ignored() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone());

        gossiper
            .handle_syn(ep(2), Syn::new("Other Cluster", vec![Digest::new(ep(2), 1, 1)]))
            .unwrap();

        assert!(messaging.sent().is_empty());
    }

    #[test]
    fn new_join_updates_live_set_and_tokens() {
        let gossiper = gossiper(ep(1), Arc::default());

        gossiper
            .handle_ack(
                ep(2),
                Ack::new(
                    Vec::new(),
                    messages::DeltaStates::from([(ep(2), peer_state(1, 2, "77"))]),
                ),
            )
            .unwrap();

        assert_eq!(gossiper.live_endpoints(), vec![ep(2)]);
        assert_eq!(
            gossiper.token_metadata().read().endpoint_for(&Token::new(77)),
            Some(ep(2))
        );
    }

    #[test]
    fn three_way_exchange_converges_two_nodes() {
        let a_out = Arc::new(RecordingMessaging::default());
        let b_out = Arc::new(RecordingMessaging::default());
        let a = gossiper(ep(1), a_out.clone()).with_seeds(vec![ep(2)]);
        let b = gossiper(ep(2), b_out.clone()).with_seeds(vec![ep(2)]);
        a.add_local_application_state(ApplicationStateKey::Tokens, "10")
            .unwrap();
        b.add_local_application_state(ApplicationStateKey::Tokens, "20")
            .unwrap();

        // a -> b: SYN
        a.run_round();
        let (to, syn) = a_out.sent().pop().unwrap();
        assert_eq!(to, ep(2));
        b.do_verb(syn);

        // b -> a: ACK
        let (to, ack) = b_out.sent().pop().unwrap();
        assert_eq!(to, ep(1));
        assert_eq!(ack.verb(), Verb::GossipDigestAck);
        a.do_verb(ack);

        // a -> b: ACK2
        let (to, ack2) = a_out.sent().pop().unwrap();
        assert_eq!(to, ep(2));
        assert_eq!(ack2.verb(), Verb::GossipDigestAck2);
        b.do_verb(ack2);

        for endpoint in [ep(1), ep(2)] {
            assert_eq!(
                a.endpoint_state(&endpoint).unwrap().max_version(),
                b.endpoint_state(&endpoint).unwrap().max_version()
            );
        }
        assert_eq!(a.live_endpoints(), vec![ep(2)]);
        assert_eq!(b.live_endpoints(), vec![ep(1)]);
        assert_eq!(a.token_metadata().read().len(), 2);
        assert_eq!(b.token_metadata().read().len(), 2);
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let gossiper = gossiper(ep(1), Arc::default());
        let message = Message::new(
            ep(2),
            Stage::Gossip,
            Verb::GossipDigestAck,
            Payload::Ack2(Ack2::default()).as_bytes().unwrap(),
        );

        assert!(matches!(
            gossiper.handle_message(message),
            Err(GossipError::PayloadMismatch(Verb::GossipDigestAck))
        ));
    }

    #[test]
    fn seed_is_contacted_when_draw_is_within_probability() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone())
            .with_seeds(vec![ep(9)])
            .with_rng(Box::new(FixedRng(0)));
        with_live_peers(&gossiper, &[2, 3, 4]);

        let syn = Syn::new("Test Cluster", gossiper.make_digests());

        assert!(gossiper.do_gossip_to_seed(&syn));
        assert_eq!(syn_targets(&messaging), vec![ep(9)]);
    }

    #[test]
    fn seed_is_skipped_when_draw_exceeds_probability() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone())
            .with_seeds(vec![ep(9)])
            .with_rng(Box::new(FixedRng(u64::MAX)));
        with_live_peers(&gossiper, &[2, 3, 4]);

        let syn = Syn::new("Test Cluster", gossiper.make_digests());

        assert!(!gossiper.do_gossip_to_seed(&syn));
        assert!(messaging.sent().is_empty());
    }

    #[test]
    fn local_endpoint_does_not_count_towards_seed_probability() {
        // one usable seed over two live peers: probability 0.5
        let skipped = Arc::new(RecordingMessaging::default());
        let unlucky = gossiper(ep(1), skipped.clone())
            .with_seeds(vec![ep(1), ep(9)])
            .with_rng(Box::new(FixedRng(3 << 62)));
        with_live_peers(&unlucky, &[2, 3]);
        let syn = Syn::new("Test Cluster", unlucky.make_digests());

        assert!(!unlucky.do_gossip_to_seed(&syn));
        assert!(skipped.sent().is_empty());

        let contacted = Arc::new(RecordingMessaging::default());
        let lucky = gossiper(ep(1), contacted.clone())
            .with_seeds(vec![ep(1), ep(9)])
            .with_rng(Box::new(FixedRng(1 << 62)));
        with_live_peers(&lucky, &[2, 3]);

        assert!(lucky.do_gossip_to_seed(&syn));
        assert_eq!(syn_targets(&contacted), vec![ep(9)]);
    }

    #[test]
    fn round_that_reached_the_only_seed_skips_seed_gossip() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone()).with_seeds(vec![ep(2)]);
        with_live_peers(&gossiper, &[2]);

        gossiper.run_round();

        assert_eq!(syn_targets(&messaging), vec![ep(2)]);
    }

    #[test]
    fn round_that_missed_the_seeds_also_gossips_to_one() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone()).with_seeds(vec![ep(9)]);
        with_live_peers(&gossiper, &[2]);

        gossiper.run_round();

        assert_eq!(syn_targets(&messaging), vec![ep(2), ep(9)]);
    }

    #[test]
    fn round_with_fewer_live_peers_than_seeds_gossips_to_a_seed_again() {
        let messaging = Arc::new(RecordingMessaging::default());
        let gossiper = gossiper(ep(1), messaging.clone()).with_seeds(vec![ep(2), ep(9)]);
        with_live_peers(&gossiper, &[2]);

        gossiper.run_round();

        let targets = syn_targets(&messaging);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], ep(2));
        assert!(gossiper.seeds().contains(&targets[1]));
    }

    #[test]
    fn concurrent_local_updates_get_distinct_versions() {
        const THREADS: u64 = 8;
        const UPDATES: u64 = 200;
        let gossiper = gossiper(ep(1), Arc::default());
        let start = gossiper.versions.current();

        thread::scope(|scope| {
            for worker in 0..THREADS {
                let gossiper = &gossiper;
                scope.spawn(move || {
                    let mut last_seen = 0;
                    for i in 0..UPDATES {
                        if i % 2 == 0 {
                            gossiper.beat().unwrap();
                        } else {
                            gossiper
                                .add_local_application_state(
                                    ApplicationStateKey::Status,
                                    format!("{worker}-{i}"),
                                )
                                .unwrap();
                        }
                        let seen = gossiper.endpoint_state(&ep(1)).unwrap().max_version();
                        assert!(seen > last_seen);
                        last_seen = seen;
                    }
                });
            }
        });

        let expected = start + THREADS * UPDATES;
        assert_eq!(gossiper.versions.current(), expected);
        assert_eq!(gossiper.endpoint_state(&ep(1)).unwrap().max_version(), expected);
    }

    #[test]
    fn token_metadata_follows_concurrently_merged_tokens() {
        for _ in 0..500 {
            let gossiper = gossiper(ep(1), Arc::default());
            gossiper.apply_state_locally(messages::DeltaStates::from([(
                ep(2),
                peer_state(1, 1, "5"),
            )]));
            let barrier = Barrier::new(2);

            thread::scope(|scope| {
                for version in [10, 11] {
                    let (gossiper, barrier) = (&gossiper, &barrier);
                    scope.spawn(move || {
                        let delta = messages::DeltaStates::from([(
                            ep(2),
                            peer_state(1, version, &version.to_string()),
                        )]);
                        barrier.wait();
                        gossiper.handle_ack2(ep(2), Ack2::new(delta));
                    });
                }
            });

            let merged: Token = gossiper
                .endpoint_state(&ep(2))
                .and_then(|state| state.tokens().map(str::to_string))
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(merged, Token::new(11));
            assert_eq!(gossiper.token_metadata().read().token_of(&ep(2)), Some(merged));
        }
    }
}
