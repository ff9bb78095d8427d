use nalgebra::{Cholesky, DMatrix};
use ndarray::{s, Array2, ArrayView2, Zip};
use nshare::{IntoNalgebra, IntoNdarray2};

use super::{check_components, check_projected, Evaluation, Objective};
use crate::error::{PursuitError, Result};

/// Feature map of the inverse map applied to the projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Decoder {
    /// `[Z, 1]` - affine reconstruction.
    Linear,
    /// `[Z, tanh(alpha * Z), 1]` - affine plus ridge-function terms.
    Tanh { alpha: f64 },
}

impl Decoder {
    /// Number of features for `k` projected coordinates, intercept included.
    fn n_features(&self, k: usize) -> usize {
        match self {
            Decoder::Linear => k + 1,
            Decoder::Tanh { .. } => 2 * k + 1,
        }
    }
}

/// Reconstruction objective parameters
///
/// ### Fields
///
/// * `decoder` - Feature map of the inverse map.
/// * `regularization` - Ridge penalty on all non-intercept coefficients.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReconstructionParams {
    pub decoder: Decoder,
    pub regularization: f64,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            decoder: Decoder::Tanh { alpha: 1.0 },
            regularization: 1e-6,
        }
    }
}

impl ReconstructionParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(PursuitError::config(format!(
                "regularization must be finite and >= 0, got {}",
                self.regularization
            )));
        }
        if let Decoder::Tanh { alpha } = self.decoder {
            if !(alpha.is_finite() && alpha > 0.0) {
                return Err(PursuitError::config(format!(
                    "decoder alpha must be finite and > 0, got {}",
                    alpha
                )));
            }
        }
        Ok(())
    }
}

/// Reconstruction error of a ridge-regression inverse map
///
/// The inverse map reconstructs `X_hat = F(Z) B` from the projected
/// coordinates. `refresh` refits `B` in closed form for the current `Z`;
/// `evaluate` then differentiates through `F` with `B` held fixed, so the map
/// and the directions are optimised alternately.
///
/// The score is the ridge objective itself,
/// `(||X - F B||^2 + lambda ||B_pen||^2) / (N D)`, so a refit can only lower
/// it.
#[derive(Debug, Clone)]
pub struct ReconstructionObjective {
    params: ReconstructionParams,
    target: Option<Array2<f64>>,
    coefficients: Option<Array2<f64>>,
    n_components: usize,
}

impl ReconstructionObjective {
    pub fn new(params: ReconstructionParams) -> Self {
        Self {
            params,
            target: None,
            coefficients: None,
            n_components: 0,
        }
    }

    pub fn params(&self) -> &ReconstructionParams {
        &self.params
    }

    /// Coefficients of the inverse map (features × D) from the last refresh.
    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    /// Apply the current inverse map to `projected`.
    pub fn reconstruct(&self, projected: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (target, coefficients) = self.fitted()?;
        check_projected(projected, target.nrows(), self.n_components)?;
        Ok(self.features(projected).dot(coefficients))
    }

    /// Mean squared error of `X - F(Z) B`, without the ridge penalty.
    pub fn mean_squared_error(&self, projected: ArrayView2<f64>) -> Result<f64> {
        let (target, _) = self.fitted()?;
        let reconstructed = self.reconstruct(projected)?;
        let sq: f64 = (reconstructed - target).iter().map(|v| v * v).sum();
        Ok(sq / Self::normaliser(target))
    }

    fn target(&self) -> Result<&Array2<f64>> {
        self.target
            .as_ref()
            .ok_or_else(|| PursuitError::config("reconstruction objective used before initialize"))
    }

    fn fitted(&self) -> Result<(&Array2<f64>, &Array2<f64>)> {
        let target = self.target()?;
        let coefficients = self.coefficients.as_ref().ok_or_else(|| {
            PursuitError::config("reconstruction objective evaluated before refresh")
        })?;
        Ok((target, coefficients))
    }

    fn features(&self, projected: ArrayView2<f64>) -> Array2<f64> {
        let (n, k) = projected.dim();
        let p = self.params.decoder.n_features(k);
        let mut features = Array2::zeros((n, p));
        features.slice_mut(s![.., ..k]).assign(&projected);
        if let Decoder::Tanh { alpha } = self.params.decoder {
            Zip::from(features.slice_mut(s![.., k..2 * k]))
                .and(projected)
                .for_each(|f, &z| *f = (alpha * z).tanh());
        }
        features.column_mut(p - 1).fill(1.0);
        features
    }

    /// Sum of squared penalised coefficients (every row but the intercept).
    fn penalty(&self, coefficients: &Array2<f64>) -> f64 {
        let rows = coefficients.nrows();
        self.params.regularization
            * coefficients
                .slice(s![..rows - 1, ..])
                .iter()
                .map(|b| b * b)
                .sum::<f64>()
    }

    fn residual(
        &self,
        features: &Array2<f64>,
        target: &Array2<f64>,
        coefficients: &Array2<f64>,
    ) -> Array2<f64> {
        features.dot(coefficients) - target
    }

    fn normaliser(target: &Array2<f64>) -> f64 {
        (target.nrows() * target.ncols()) as f64
    }
}

impl Objective for ReconstructionObjective {
    fn name(&self) -> &'static str {
        "reconstruction"
    }

    fn initialize(&mut self, data: ArrayView2<f64>, n_components: usize) -> Result<()> {
        self.target = None;
        self.coefficients = None;
        self.params.validate()?;
        check_components(n_components, data.ncols())?;

        self.target = Some(data.to_owned());
        self.n_components = n_components;
        Ok(())
    }

    /// Refit the inverse map by solving `(F^T F + lambda P) B = F^T X`.
    fn refresh(&mut self, data: ArrayView2<f64>, projected: ArrayView2<f64>) -> Result<()> {
        let target = self.target()?;
        check_projected(projected, target.nrows(), self.n_components)?;
        if data.dim() != target.dim() {
            return Err(PursuitError::config(format!(
                "refresh called with a {} × {} dataset, initialized with {} × {}",
                data.nrows(),
                data.ncols(),
                target.nrows(),
                target.ncols()
            )));
        }

        let features = self.features(projected);
        let p = features.ncols();
        let mut gram = features.t().dot(&features);
        for i in 0..p - 1 {
            gram[[i, i]] += self.params.regularization;
        }
        let rhs = features.t().dot(target);

        let gram: DMatrix<f64> = gram.into_nalgebra();
        let rhs: DMatrix<f64> = rhs.into_nalgebra();
        let chol = Cholesky::new(gram).ok_or_else(|| {
            PursuitError::SingularSystem(format!(
                "inverse-map normal equations ({} × {}) are not positive definite",
                p, p
            ))
        })?;
        let coefficients = chol.solve(&rhs).into_ndarray2().into_owned();

        if coefficients.iter().any(|b| !b.is_finite()) {
            return Err(PursuitError::SingularSystem(
                "inverse-map refit produced non-finite coefficients".to_string(),
            ));
        }

        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn evaluate(&self, projected: ArrayView2<f64>) -> Result<Evaluation> {
        let (target, coefficients) = self.fitted()?;
        check_projected(projected, target.nrows(), self.n_components)?;

        let k = self.n_components;
        let norm = Self::normaliser(target);
        let features = self.features(projected);
        let residual = self.residual(&features, target, coefficients);
        let sq: f64 = residual.iter().map(|r| r * r).sum();
        let score = (sq + self.penalty(coefficients)) / norm;

        // dS/dF = 2 R B^T / (N D); the penalty does not depend on Z
        let d_features = residual.dot(&coefficients.t()) * (2.0 / norm);
        let mut gradient = d_features.slice(s![.., ..k]).to_owned();
        if let Decoder::Tanh { alpha } = self.params.decoder {
            Zip::from(&mut gradient)
                .and(d_features.slice(s![.., k..2 * k]))
                .and(features.slice(s![.., k..2 * k]))
                .for_each(|g, &df, &t| *g += df * alpha * (1.0 - t * t));
        }

        Ok(Evaluation { score, gradient })
    }

    fn score(&self, projected: ArrayView2<f64>) -> Result<f64> {
        let (target, coefficients) = self.fitted()?;
        check_projected(projected, target.nrows(), self.n_components)?;

        let features = self.features(projected);
        let residual = self.residual(&features, target, coefficients);
        let sq: f64 = residual.iter().map(|r| r * r).sum();
        Ok((sq + self.penalty(coefficients)) / Self::normaliser(target))
    }
}
