//! # Principal Component Analysis
//!
//! Dense PCA over `ArrayView2<f64>` via an eigendecomposition of the sample
//! covariance. Provides the top-K variance directions used to initialise
//! projection pursuit and the linear reconstruction baseline it is compared
//! against.

use nalgebra::{DMatrix, SymmetricEigen as NalgebraSymmetricEigen};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use nshare::{IntoNalgebra, IntoNdarray2};
use std::sync::Arc;

use crate::error::{PursuitError, Result};
use crate::utils::{preprocess, ColumnStats};

/// Eigendecomposition backend for symmetric (covariance) matrices.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvalues in descending order
/// and eigenvectors as the rows of the second matrix.
pub trait EigenSolver: Send + Sync {
    fn compute(&self, matrix: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)>;
}

/// Symmetric eigendecomposition through nalgebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricEigen;

impl EigenSolver for SymmetricEigen {
    fn compute(&self, matrix: ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        let (n, m) = matrix.dim();
        if n != m {
            return Err(PursuitError::config(format!(
                "eigendecomposition needs a square matrix, got {} × {}",
                n, m
            )));
        }

        let sym: DMatrix<f64> = matrix.to_owned().into_nalgebra();
        let eig = NalgebraSymmetricEigen::new(sym);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let vectors = eig.eigenvectors.transpose().into_ndarray2().into_owned();
        let mut values = Array1::zeros(n);
        let mut rows = Array2::zeros((n, n));
        for (dst, &src) in order.iter().enumerate() {
            values[dst] = eig.eigenvalues[src];
            rows.row_mut(dst).assign(&vectors.row(src));
        }

        Ok((values, rows))
    }
}

pub struct PCABuilder<S: EigenSolver> {
    n_components: Option<usize>,
    center: bool,
    scale: bool,
    solver: Arc<S>,
}

impl<S: EigenSolver> PCABuilder<S> {
    pub fn new(solver: S) -> Self {
        PCABuilder {
            n_components: None,
            center: true,
            scale: false,
            solver: Arc::new(solver),
        }
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn build(self) -> Pca<S> {
        Pca {
            n_components: self.n_components,
            center: self.center,
            scale: self.scale,
            solver: self.solver,
            components: None,
            mean: None,
            std_dev: None,
            explained_variance_ratio: None,
            total_variance: None,
            eigenvalues: None,
        }
    }
}

pub struct Pca<S: EigenSolver> {
    n_components: Option<usize>,
    center: bool,
    scale: bool,
    solver: Arc<S>,
    components: Option<Array2<f64>>,
    mean: Option<Array1<f64>>,
    std_dev: Option<Array1<f64>>,
    explained_variance_ratio: Option<Array1<f64>>,
    total_variance: Option<f64>,
    eigenvalues: Option<Array1<f64>>,
}

impl<S: EigenSolver> Pca<S> {
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        let (n_samples, n_features) = x.dim();
        let n_components = self.n_components.unwrap_or(n_features);
        if n_components == 0 || n_components > n_features {
            return Err(PursuitError::config(format!(
                "n_components must be in 1..={}, got {}",
                n_features, n_components
            )));
        }
        if n_samples < 2 {
            return Err(PursuitError::InsufficientData {
                distinct: n_samples,
                required: 2,
            });
        }

        let stats = ColumnStats::from_data(x)?;
        let mean = self.center.then(|| stats.mean.clone());
        let std_dev = self.scale.then(|| stats.std_dev.clone());

        let x_preprocessed = preprocess(x, mean.as_ref(), std_dev.as_ref());
        let covariance =
            x_preprocessed.t().dot(&x_preprocessed) / (n_samples as f64 - 1.0);

        let (eigenvalues, mut vectors) = self.solver.compute(covariance.view())?;
        // round-off can leave tiny negative eigenvalues on rank-deficient data
        let eigenvalues = eigenvalues.mapv(|v| v.max(0.0));
        flip_signs(&mut vectors);

        let total_variance = eigenvalues.sum();
        let explained_variance_ratio = if total_variance > 0.0 {
            &eigenvalues / total_variance
        } else {
            Array1::zeros(eigenvalues.len())
        };

        self.components = Some(vectors.slice(ndarray::s![..n_components, ..]).to_owned());
        self.mean = mean;
        self.std_dev = std_dev;
        self.explained_variance_ratio = Some(
            explained_variance_ratio
                .slice(ndarray::s![..n_components])
                .to_owned(),
        );
        self.total_variance = Some(total_variance);
        self.eigenvalues = Some(eigenvalues.slice(ndarray::s![..n_components]).to_owned());

        Ok(())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let components = self
            .components
            .as_ref()
            .ok_or_else(|| PursuitError::config("PCA has not been fitted yet"))?;
        if x.ncols() != components.ncols() {
            return Err(PursuitError::config(format!(
                "expected {} features, got {}",
                components.ncols(),
                x.ncols()
            )));
        }
        let x_preprocessed = preprocess(x, self.mean.as_ref(), self.std_dev.as_ref());
        Ok(x_preprocessed.dot(&components.t()))
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Principal axes as rows (n_components × n_features), orthonormal.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    pub fn total_variance(&self) -> Option<f64> {
        self.total_variance
    }

    pub fn eigenvalues(&self) -> Option<&Array1<f64>> {
        self.eigenvalues.as_ref()
    }
}

/// Make the largest-magnitude loading of every row positive.
fn flip_signs(vectors: &mut Array2<f64>) {
    for mut row in vectors.axis_iter_mut(Axis(0)) {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
        }
    }
}

/// Top-`k` variance directions (k × D) of `x`.
pub fn top_variance_directions(x: ArrayView2<f64>, k: usize) -> Result<Array2<f64>> {
    let mut pca = PCABuilder::new(SymmetricEigen).n_components(k).build();
    pca.fit(x)?;
    pca.components
        .take()
        .ok_or_else(|| PursuitError::config("PCA produced no components"))
}
