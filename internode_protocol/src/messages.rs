use crate::InternodeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{Cursor, Read},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

/// Upper bound for each length-prefixed section of an encoded message.
pub const MAX_SECTION_LEN: usize = 16 * 1024 * 1024;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
/// Address and port identifying a cluster member.
///
/// Compared and hashed by value, so it can key every map in the system.
/// On the wire it is the `ip:port` string.
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    /// Shorthand for an IPv4 endpoint, mostly used by tests and local clusters.
    pub fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), port)
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Endpoint {
    type Err = InternodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<SocketAddr>()
            .map(Self)
            .map_err(|_| InternodeError::InvalidEndpoint(s.to_string()))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = InternodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Processing stage a message belongs to.
/// - `Gossip`: membership anti-entropy traffic.
/// - `Mutation`: writes applied on a replica.
/// - `RequestResponse`: replies routed back to a waiting coordinator.
pub enum Stage {
    Gossip,
    Mutation,
    RequestResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Operation requested by a message. Together with the [`Stage`] it selects the handler.
pub enum Verb {
    GossipDigestSyn,
    GossipDigestAck,
    GossipDigestAck2,
    Mutation,
    MutationResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Routing information carried in front of every payload.
///
/// ### Fields
/// - `from`: The endpoint that sent the message.
/// - `stage`: The stage the message is processed in.
/// - `verb`: The operation requested.
pub struct Header {
    pub from: Endpoint,
    pub stage: Stage,
    pub verb: Verb,
}

#[derive(Debug, Clone, PartialEq)]
/// A message travelling between two endpoints: routing header plus an opaque payload.
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new `Message`.
    pub fn new(from: Endpoint, stage: Stage, verb: Verb, payload: Vec<u8>) -> Self {
        Self {
            header: Header { from, stage, verb },
            payload,
        }
    }

    pub fn from(&self) -> Endpoint {
        self.header.from
    }

    pub fn verb(&self) -> Verb {
        self.header.verb
    }

    /// ```md
    /// 0    8    16   24   32
    /// +----+----+----+----+
    /// |   header length   |
    /// +----+----+----+----+
    /// |   header (json)   |
    /// |        ...        |
    /// +----+----+----+----+
    /// |   payload length  |
    /// +----+----+----+----+
    /// |      payload      |
    /// |        ...        |
    /// +----+----+----+----+
    /// ```
    /// Convert the `Message` to a byte array.
    pub fn as_bytes(&self) -> Result<Vec<u8>, InternodeError> {
        let header = serde_json::to_vec(&self.header)?;

        let mut bytes = Vec::with_capacity(8 + header.len() + self.payload.len());
        bytes.extend_from_slice(&section_len(header.len())?.to_be_bytes());
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&section_len(self.payload.len())?.to_be_bytes());
        bytes.extend_from_slice(&self.payload);

        Ok(bytes)
    }

    /// Create a `Message` from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InternodeError> {
        let mut cursor = Cursor::new(bytes);

        let header = read_section(&mut cursor)?;
        let header: Header = serde_json::from_slice(&header)?;
        let payload = read_section(&mut cursor)?;

        Ok(Self { header, payload })
    }
}

fn section_len(len: usize) -> Result<u32, InternodeError> {
    if len > MAX_SECTION_LEN {
        return Err(InternodeError::FrameTooLarge(len));
    }
    Ok(len as u32)
}

fn read_section(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>, InternodeError> {
    let mut len_bytes = [0u8; 4];
    cursor.read_exact(&mut len_bytes)?;

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_SECTION_LEN {
        return Err(InternodeError::FrameTooLarge(len));
    }

    let mut section = vec![0u8; len];
    cursor.read_exact(&mut section)?;
    Ok(section)
}
