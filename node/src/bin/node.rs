use clap::Parser;
use coordinator::{consistency::ConsistencyLevel, errors::CoordinatorError};
use internode_protocol::{
    internode_link::{InternodeLink, TcpMessagingService},
    Endpoint,
};
use logger::Logger;
use node::{config::NodeConfig, errors::NodeError, Node};
use std::{
    io::{self, BufRead, Write},
    sync::Arc,
};
use storage::MemoryStorageEngine;
use tracing::{error, info};

/// Starts a cluster member and reads `PUT <table> <key> <value>` lines from stdin.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on, also the node's identity.
    #[arg(long, env = "NODE_LISTEN")]
    listen: Endpoint,

    /// Comma-separated seed addresses.
    #[arg(long, env = "NODE_SEEDS", value_delimiter = ',')]
    seeds: Vec<Endpoint>,

    #[arg(long, env = "NODE_CLUSTER_NAME", default_value = "Test Cluster")]
    cluster_name: String,

    /// Ring token; a random one is picked when omitted.
    #[arg(long, env = "NODE_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "NODE_REPLICATION_FACTOR", default_value_t = 2)]
    replication_factor: usize,

    #[arg(long, env = "NODE_CONSISTENCY", default_value = "QUORUM")]
    consistency: ConsistencyLevel,

    #[arg(long, env = "NODE_GOSSIP_INTERVAL_MS", default_value_t = 1000)]
    gossip_interval_ms: u64,

    #[arg(long, env = "NODE_WRITE_TIMEOUT_MS", default_value_t = 2000)]
    write_timeout_ms: u64,

    /// Log to this file instead of the console.
    #[arg(long, env = "NODE_LOG_FILE")]
    log_file: Option<String>,
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        NodeConfig {
            cluster_name: args.cluster_name,
            listen: args.listen,
            seeds: args.seeds,
            token: args.token,
            replication_factor: args.replication_factor,
            consistency: args.consistency,
            gossip_interval_ms: args.gossip_interval_ms,
            write_timeout_ms: args.write_timeout_ms,
        }
    }
}

fn main() -> Result<(), NodeError> {
    let args = Args::parse();
    let _logger = Logger::init(args.log_file.is_some(), args.log_file.as_deref())?;

    let node = Node::new(
        NodeConfig::from(args),
        Arc::new(TcpMessagingService::new()),
        Arc::new(MemoryStorageEngine::new()),
    )?;

    let link = InternodeLink::bind(node.endpoint(), node.dispatcher())?;
    let _listener = link.start();
    node.start()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            [command, table, key, value] if command.eq_ignore_ascii_case("PUT") => {
                print_put(&node, table, key, value)?
            }
            _ => println!("usage: PUT <table> <key> <value>"),
        }
    }

    info!("stdin closed, shutting down");
    node.stop();
    Ok(())
}

fn print_put(node: &Node, table: &str, key: &str, value: &str) -> Result<(), NodeError> {
    let mut out = io::stdout().lock();
    match node.put(table, key, value) {
        Ok(responses) => {
            writeln!(out, "OK ({} responses)", responses.len())?;
            for response in responses {
                writeln!(out, "  {} success={}", response.from, response.success)?;
            }
        }
        Err(NodeError::Coordinator(CoordinatorError::QuorumNotMet {
            required,
            responses,
        })) => {
            writeln!(out, "FAILED: quorum not met ({required} required)")?;
            for response in responses {
                writeln!(
                    out,
                    "  {} success={} {}",
                    response.from,
                    response.success,
                    response.error.unwrap_or_default()
                )?;
            }
        }
        Err(e) => {
            error!(error = %e, "write failed");
            writeln!(out, "FAILED: {e}")?;
        }
    }
    Ok(())
}
