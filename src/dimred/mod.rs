//! # Dimensionality Reduction
//!
//! Linear projections of dense data onto a small number of orthonormal
//! directions.
//!
//! ## Available
//! - **PCA** ([`pca`]): top-K variance directions. Closed form, used as the
//!   default starting point and as a baseline.
//! - **Projection pursuit** ([`pursuit`]): directions chosen by minimising an
//!   objective over the projected coordinates, e.g. pairwise distance stress or
//!   the error of a fitted inverse map.
//!
//! ## Choosing
//! - Use **PCA** when retained variance is the criterion and interpretability
//!   of the loadings matters.
//! - Use **projection pursuit** when the projection should preserve geometry
//!   (distance objective) or allow a non-linear reconstruction (reconstruction
//!   objective).

pub mod pca;
pub mod pursuit;
