use ndarray::Array2;
use thiserror::Error;

use crate::dimred::pursuit::FitStatus;

pub type Result<T> = std::result::Result<T, PursuitError>;

/// State of the last stable iteration of a fit that had to be aborted.
#[derive(Debug, Clone)]
pub struct PartialFit {
    /// Orthonormal directions (K × D) of the last iteration with a finite score.
    pub directions: Array2<f64>,
    /// Score belonging to `directions`.
    pub score: f64,
    /// Index of the last stable iteration (0 is the initialization).
    pub iteration: usize,
    /// Always [`FitStatus::AbortedNumericalError`].
    pub status: FitStatus,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PursuitError {
    /// Invalid number of directions, hyperparameter or dataset shape.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("insufficient data: {distinct} distinct points, at least {required} required")]
    InsufficientData { distinct: usize, required: usize },

    #[error(
        "numerical instability after iteration {}: {} (last stable score {})",
        .0.iteration,
        .0.reason,
        .0.score
    )]
    NumericalInstability(Box<PartialFit>),

    /// A linear system inside an objective could not be solved.
    #[error("singular system: {0}")]
    SingularSystem(String),
}

impl PursuitError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PursuitError::Configuration(msg.into())
    }

    /// Partial progress of an aborted fit, if this error carries one.
    pub fn partial_fit(&self) -> Option<&PartialFit> {
        match self {
            PursuitError::NumericalInstability(partial) => Some(partial),
            _ => None,
        }
    }
}
