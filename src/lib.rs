pub mod dimred;
pub mod error;
pub mod metrics;
pub mod utils;

pub use dimred::pca::{EigenSolver, PCABuilder, Pca, SymmetricEigen};
pub use dimred::pursuit::{
    fit, Decoder, DistanceParams, FitResult, FitStatus, Initialization, ObjectiveKind,
    ProjectionPursuit, PursuitConfig, PursuitConfigBuilder, ReconstructionParams,
};
pub use error::{PartialFit, PursuitError, Result};
