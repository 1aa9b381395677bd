use errors::PartitionerError;
use internode_protocol::Endpoint;
use murmur3::murmur3_x64_128;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
pub mod errors;

/// Position on the hash ring. Keys and nodes are placed on the same ring.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Token(u128);

impl Token {
    pub fn new(value: u128) -> Self {
        Token(value)
    }

    /// Places `key` on the ring.
    pub fn from_key<T: AsRef<[u8]>>(key: T) -> Result<Self, PartitionerError> {
        let mut reader = Cursor::new(key);
        Ok(Token(murmur3_x64_128(&mut reader, 0)?))
    }

    /// Picks a random ring position, used when a node is not given one.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Token(rng.gen())
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Token {
    type Err = PartitionerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u128>()
            .map(Token)
            .map_err(|_| PartitionerError::InvalidToken(s.to_string()))
    }
}

/// Which endpoint owns which token.
///
/// Each endpoint owns a single token; assigning it a new one moves it on the ring.
#[derive(Clone, Default)]
pub struct TokenMetadata {
    token_to_endpoint: BTreeMap<Token, Endpoint>,
    endpoint_to_token: HashMap<Endpoint, Token>,
}

impl TokenMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)assigns `token` to `endpoint`. Calling it again with the same pair is a no-op.
    pub fn update(&mut self, token: Token, endpoint: Endpoint) {
        if let Some(previous) = self.endpoint_to_token.insert(endpoint, token) {
            if previous != token && self.token_to_endpoint.get(&previous) == Some(&endpoint) {
                self.token_to_endpoint.remove(&previous);
            }
        }

        if let Some(displaced) = self.token_to_endpoint.insert(token, endpoint) {
            if displaced != endpoint {
                self.endpoint_to_token.remove(&displaced);
                tracing::warn!(%token, from = %displaced, to = %endpoint, "token changed owner");
            }
        }
    }

    pub fn token_of(&self, endpoint: &Endpoint) -> Option<Token> {
        self.endpoint_to_token.get(endpoint).copied()
    }

    pub fn endpoint_for(&self, token: &Token) -> Option<Endpoint> {
        self.token_to_endpoint.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.token_to_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_endpoint.is_empty()
    }

    /// Walks the ring clockwise from `token`, collecting distinct owners until
    /// `replication_factor` are found. Returns every owner when the ring is smaller.
    pub fn endpoints_for_token(&self, token: Token, replication_factor: usize) -> Vec<Endpoint> {
        let mut endpoints = Vec::with_capacity(replication_factor);

        let clockwise = self
            .token_to_endpoint
            .range(token..)
            .chain(self.token_to_endpoint.range(..token));

        for (_, endpoint) in clockwise {
            if endpoints.len() == replication_factor {
                break;
            }
            if !endpoints.contains(endpoint) {
                endpoints.push(*endpoint);
            }
        }

        endpoints
    }

    /// Replicas responsible for `key`.
    pub fn endpoints_for_key<T: AsRef<[u8]>>(
        &self,
        key: T,
        replication_factor: usize,
    ) -> Result<Vec<Endpoint>, PartitionerError> {
        let token = Token::from_key(key)?;
        Ok(self.endpoints_for_token(token, replication_factor))
    }
}

impl fmt::Debug for TokenMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring: Vec<String> = self
            .token_to_endpoint
            .iter()
            .map(|(token, endpoint)| format!("{endpoint}@{token}"))
            .collect();
        if !ring.is_empty() {
            write!(f, "{}", ring.join(" -> "))
        } else {
            write!(f, "No nodes available")
        }
    }
}
