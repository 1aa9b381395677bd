use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Represents the heartbeat state of the endpoint in the cluster at a given point in time.
///
/// ### Fields
/// - `generation`: Changes only when the node restarts.
/// - `version`: Bumped on every local heartbeat.
pub struct HeartbeatState {
    pub generation: i64,
    pub version: u64,
}

impl HeartbeatState {
    /// Creates a new `HeartbeatState` with the given `generation` and `version`.
    pub fn new(generation: i64, version: u64) -> Self {
        Self {
            generation,
            version,
        }
    }

    /// Same generation, new version.
    pub fn with_version(self, version: u64) -> Self {
        Self { version, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An application-level fact tagged with the version it was set at.
pub struct VersionedValue {
    pub value: String,
    pub version: u64,
}

impl VersionedValue {
    pub fn new(value: impl Into<String>, version: u64) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Keys of the application states a node publishes about itself.
pub enum ApplicationStateKey {
    /// Lifecycle of the node, see [`NodeStatus`].
    Status,
    /// The node's ring token, as a decimal string.
    Tokens,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
/// Represents the status of the node in the cluster.
pub enum NodeStatus {
    #[default]
    /// The node is in the process of joining the cluster.
    Bootstrap,
    /// The node is in the cluster, and is fully operational.
    Normal,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Bootstrap => "BOOT",
            NodeStatus::Normal => "NORMAL",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOT" => Ok(NodeStatus::Bootstrap),
            "NORMAL" => Ok(NodeStatus::Normal),
            other => Err(format!("unknown node status `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Everything known about one endpoint: its heartbeat plus the application states it published.
///
/// Values are never changed in place. Every `with_*` method returns a new
/// state, which the owner then publishes as a whole, so readers only ever
/// see complete states.
pub struct EndpointState {
    heartbeat_state: HeartbeatState,
    application_states: BTreeMap<ApplicationStateKey, VersionedValue>,
}

impl EndpointState {
    /// Creates a new `EndpointState` with no application states.
    pub fn new(heartbeat_state: HeartbeatState) -> Self {
        Self {
            heartbeat_state,
            application_states: BTreeMap::new(),
        }
    }

    pub fn heartbeat_state(&self) -> HeartbeatState {
        self.heartbeat_state
    }

    pub fn generation(&self) -> i64 {
        self.heartbeat_state.generation
    }

    pub fn application_state(&self, key: ApplicationStateKey) -> Option<&VersionedValue> {
        self.application_states.get(&key)
    }

    pub fn application_states(&self) -> &BTreeMap<ApplicationStateKey, VersionedValue> {
        &self.application_states
    }

    pub fn with_heartbeat_state(&self, heartbeat_state: HeartbeatState) -> Self {
        Self {
            heartbeat_state,
            application_states: self.application_states.clone(),
        }
    }

    pub fn with_application_state(&self, key: ApplicationStateKey, value: VersionedValue) -> Self {
        let mut application_states = self.application_states.clone();
        application_states.insert(key, value);
        Self {
            heartbeat_state: self.heartbeat_state,
            application_states,
        }
    }

    /// Highest version among the heartbeat and every application state.
    pub fn max_version(&self) -> u64 {
        self.application_states
            .values()
            .map(|value| value.version)
            .fold(self.heartbeat_state.version, u64::max)
    }

    pub fn status(&self) -> Option<NodeStatus> {
        self.application_state(ApplicationStateKey::Status)
            .and_then(|value| value.value.parse().ok())
    }

    pub fn tokens(&self) -> Option<&str> {
        self.application_state(ApplicationStateKey::Tokens)
            .map(|value| value.value.as_str())
    }
}
