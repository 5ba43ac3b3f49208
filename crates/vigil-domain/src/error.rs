/// Errors raised while building a domain or converting points.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("categorical domain has no values")]
    EmptyCategorical,

    #[error("box domain has no intervals")]
    EmptyBox,

    #[error("interval has lo > hi: lo={lo}, hi={hi}")]
    InvertedInterval { lo: f64, hi: f64 },

    #[error("interval bound is not finite: lo={lo}, hi={hi}")]
    NonFiniteBound { lo: f64, hi: f64 },

    #[error("integer interval has lo > hi: lo={lo}, hi={hi}")]
    InvertedIntegerInterval { lo: i64, hi: i64 },

    #[error("variable list length range is inverted: min={min}, max={max}")]
    InvertedLength { min: usize, max: usize },

    #[error("variable-length list cannot be nested inside {container}")]
    NestedVariableList { container: &'static str },

    #[error("array shape must have at least one axis")]
    EmptyShape,

    #[error("flat vector has {actual} coordinates, expected {expected}")]
    FlatLengthMismatch { expected: usize, actual: usize },

    #[error("standard vector has {actual_continuous} continuous and {actual_discrete} discrete coordinates, expected {expected_continuous} and {expected_discrete}")]
    StandardLengthMismatch {
        expected_continuous: usize,
        expected_discrete: usize,
        actual_continuous: usize,
        actual_discrete: usize,
    },

    #[error("domain is not standardizable: {0}")]
    NotStandardizable(String),

    #[error("point does not conform to domain at '{path}': expected {expected}, found {found}")]
    PointMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("expected {expected} list lengths, got {actual}")]
    LengthCountMismatch { expected: usize, actual: usize },

    #[error("cannot rejoin points: {0}")]
    Rejoin(String),
}

impl DomainError {
    pub(crate) fn mismatch(path: &str, expected: impl Into<String>, found: impl Into<String>) -> Self {
        DomainError::PointMismatch {
            path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
            expected: expected.into(),
            found: found.into(),
        }
    }
}
