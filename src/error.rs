use thiserror::Error;

/// Errors reported by index construction.
///
/// Query operations (`search`, `lower_bound`, `size`, `key_at`) are total:
/// they return a defined sentinel for out-of-range input rather than an
/// `Err`, and never appear here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FastError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("allocation failed: {0}")]
    OutOfMemory(String),
}

pub type Result<T> = std::result::Result<T, FastError>;
