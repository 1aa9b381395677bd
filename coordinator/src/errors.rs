use internode_protocol::InternodeError;
use partitioner::errors::PartitionerError;
use storage::mutation::WriteResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Fewer replicas own the key than the consistency level needs; nothing was sent.
    #[error("cannot achieve consistency: {required} replicas required but only {alive} known")]
    Unavailable { required: usize, alive: usize },

    /// The write reached fewer replicas than required before the timeout.
    /// `responses` holds every answer that did arrive, failures included.
    #[error("quorum not met: {required} successful responses required, got {}", successes(.responses))]
    QuorumNotMet {
        required: usize,
        responses: Vec<WriteResponse>,
    },

    #[error("unknown consistency level `{0}`")]
    InvalidConsistency(String),

    #[error(transparent)]
    Partitioner(#[from] PartitionerError),

    #[error(transparent)]
    Internode(#[from] InternodeError),
}

fn successes(responses: &[WriteResponse]) -> usize {
    responses.iter().filter(|response| response.success).count()
}
