use vigil_explore::SamplingError;

use crate::confidence::StatsError;
use crate::error_table::TableError;
use crate::priority::PriorityError;

/// Errors that end a falsification run.
#[derive(Debug, thiserror::Error)]
pub enum FalsifyError {
    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("priority graph error: {0}")]
    Priority(#[from] PriorityError),

    #[error("statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{limit} consecutive samples from {domain} were infeasible")]
    RejectionLimit { domain: String, limit: usize },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
