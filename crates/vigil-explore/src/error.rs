use vigil_domain::DomainError;

/// Errors raised while constructing or drawing from a sampler.
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// The sampler has produced every point it will ever produce.
    #[error("sampler exhausted")]
    Exhausted,

    /// The drawn point was rejected; the caller may draw again.
    #[error("sample rejected")]
    Rejected,

    #[error("sampler '{sampler}' exceeded {limit} consecutive rejections")]
    RejectionLimit { sampler: String, limit: usize },

    #[error("partition is not exhaustive and no default sampler was given: {0} unclaimed")]
    NonExhaustivePartition(String),

    #[error("{sampler} does not support domain {domain}")]
    Unsupported { sampler: String, domain: String },

    #[error("invalid sampler parameters: {0}")]
    InvalidParams(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SamplingError {
    pub(crate) fn unsupported(sampler: &str, domain: &vigil_domain::Domain) -> Self {
        SamplingError::Unsupported {
            sampler: sampler.to_string(),
            domain: domain.describe(),
        }
    }

    /// Whether this error ends a run normally rather than failing it.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, SamplingError::Exhausted)
    }
}
