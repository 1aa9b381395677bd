use coordinator::errors::CoordinatorError;
use gossip::error::GossipError;
use internode_protocol::InternodeError;
use logger::LoggerError;
use partitioner::errors::PartitionerError;
use std::io;
use thiserror::Error;

/// Errors surfaced by a [`Node`](crate::Node).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Partitioner Error: {0}")]
    Partitioner(#[from] PartitionerError),

    #[error("Gossip Error: {0}")]
    Gossip(#[from] GossipError),

    #[error("Coordinator Error: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("Internode Error: {0}")]
    Internode(#[from] InternodeError),

    #[error("Logger Error: {0}")]
    Logger(#[from] LoggerError),

    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
