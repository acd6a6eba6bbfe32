//! Error type shared by every stage of the kernel adaptation pipeline.
//!
//! Nothing here is recovered or retried: any error aborts the current run.

use thiserror::Error;

/// Root error for kernel construction, decomposition, reconstruction and evaluation.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Kernel, offsets, labels or index set disagree on dimensions.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// NaN or infinite kernel entry.
    #[error("kernel entry ({row}, {col}) is not finite")]
    NonFinite { row: usize, col: usize },

    /// Kernel failed the symmetry check.
    #[error("kernel is not symmetric at ({row}, {col}): |K_ij - K_ji| = {delta:e}")]
    Asymmetric { row: usize, col: usize, delta: f64 },

    /// Eigensolver failed, did not converge, or the block is too small for the rank.
    #[error("decomposition failure: {0}")]
    DecompositionFailure(String),

    /// A grid axis has no candidate values.
    #[error("empty candidate set for axis `{0}`")]
    EmptyCandidateSet(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed svmlight input.
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Regularised system could not be factorised.
    #[error("solve failure: {0}")]
    SolveFailure(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type KernelResult<T> = Result<T, KernelError>;
