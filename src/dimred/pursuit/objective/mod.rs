//! # Pursuit objectives
//!
//! An objective scores a matrix of projected coordinates `Z` (N × K) and
//! returns the gradient of that score with respect to `Z`. Lower scores are
//! better. The engine never looks inside an objective; it only drives the
//! three operations of [`Objective`]:
//!
//! 1. [`Objective::initialize`] once per fit, from the (immutable) dataset
//! 2. [`Objective::refresh`] once per outer iteration, before evaluation
//! 3. [`Objective::evaluate`] (score + gradient) and [`Objective::score`]
//!    (score only, used by the line search)
//!
//! The available objectives form the closed set [`PursuitObjective`], selected
//! through [`ObjectiveKind`].

mod distance;
mod reconstruction;

pub use distance::{DistanceObjective, DistanceParams};
pub use reconstruction::{Decoder, ReconstructionObjective, ReconstructionParams};

use ndarray::{Array2, ArrayView2};

use crate::error::{PursuitError, Result};

/// Score and coordinate-space gradient of one evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub score: f64,
    /// d(score) / dZ, same shape as the projected coordinates (N × K).
    pub gradient: Array2<f64>,
}

impl Evaluation {
    /// Description of the first non-finite quantity, if any.
    pub fn non_finite(&self) -> Option<&'static str> {
        if !self.score.is_finite() {
            Some("non-finite score")
        } else if self.gradient.iter().any(|v| !v.is_finite()) {
            Some("non-finite gradient")
        } else {
            None
        }
    }
}

pub trait Objective {
    fn name(&self) -> &'static str;

    /// Build the auxiliary state for `data` (N × D) and `n_components`
    /// directions. Discards any state from a previous dataset.
    fn initialize(&mut self, data: ArrayView2<f64>, n_components: usize) -> Result<()>;

    /// Update state that depends on the current projection. No-op for
    /// objectives with static state.
    fn refresh(&mut self, _data: ArrayView2<f64>, _projected: ArrayView2<f64>) -> Result<()> {
        Ok(())
    }

    /// Score and gradient for `projected` (N × K). Deterministic.
    fn evaluate(&self, projected: ArrayView2<f64>) -> Result<Evaluation>;

    /// Score only. Implementors override this when the gradient is costly.
    fn score(&self, projected: ArrayView2<f64>) -> Result<f64> {
        Ok(self.evaluate(projected)?.score)
    }
}

/// Objective selector plus its hyperparameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectiveKind {
    Distance(DistanceParams),
    Reconstruction(ReconstructionParams),
}

impl Default for ObjectiveKind {
    fn default() -> Self {
        ObjectiveKind::Distance(DistanceParams::default())
    }
}

impl ObjectiveKind {
    pub fn validate(&self) -> Result<()> {
        match self {
            ObjectiveKind::Distance(p) => p.validate(),
            ObjectiveKind::Reconstruction(p) => p.validate(),
        }
    }

    /// Fresh, uninitialized objective of this kind.
    pub fn build(&self) -> PursuitObjective {
        match self {
            ObjectiveKind::Distance(p) => PursuitObjective::Distance(DistanceObjective::new(p.clone())),
            ObjectiveKind::Reconstruction(p) => {
                PursuitObjective::Reconstruction(ReconstructionObjective::new(p.clone()))
            }
        }
    }
}

/// Closed set of objectives the engine can drive.
#[derive(Debug, Clone)]
pub enum PursuitObjective {
    Distance(DistanceObjective),
    Reconstruction(ReconstructionObjective),
}

impl Objective for PursuitObjective {
    fn name(&self) -> &'static str {
        match self {
            PursuitObjective::Distance(o) => o.name(),
            PursuitObjective::Reconstruction(o) => o.name(),
        }
    }

    fn initialize(&mut self, data: ArrayView2<f64>, n_components: usize) -> Result<()> {
        match self {
            PursuitObjective::Distance(o) => o.initialize(data, n_components),
            PursuitObjective::Reconstruction(o) => o.initialize(data, n_components),
        }
    }

    fn refresh(&mut self, data: ArrayView2<f64>, projected: ArrayView2<f64>) -> Result<()> {
        match self {
            PursuitObjective::Distance(o) => o.refresh(data, projected),
            PursuitObjective::Reconstruction(o) => o.refresh(data, projected),
        }
    }

    fn evaluate(&self, projected: ArrayView2<f64>) -> Result<Evaluation> {
        match self {
            PursuitObjective::Distance(o) => o.evaluate(projected),
            PursuitObjective::Reconstruction(o) => o.evaluate(projected),
        }
    }

    fn score(&self, projected: ArrayView2<f64>) -> Result<f64> {
        match self {
            PursuitObjective::Distance(o) => o.score(projected),
            PursuitObjective::Reconstruction(o) => o.score(projected),
        }
    }
}

/// Shared `initialize` checks: K within `1..=D`.
pub(crate) fn check_components(n_components: usize, n_features: usize) -> Result<()> {
    if n_components == 0 || n_components > n_features {
        return Err(PursuitError::config(format!(
            "number of directions must be in 1..={}, got {}",
            n_features, n_components
        )));
    }
    Ok(())
}

/// Shared `evaluate` checks: the projection matches the initialized shape.
pub(crate) fn check_projected(
    projected: ArrayView2<f64>,
    n_samples: usize,
    n_components: usize,
) -> Result<()> {
    if projected.dim() != (n_samples, n_components) {
        return Err(PursuitError::config(format!(
            "projected coordinates must be {} × {}, got {} × {}",
            n_samples,
            n_components,
            projected.nrows(),
            projected.ncols()
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_objective_kind_builds_matching_variant() {
        let obj = ObjectiveKind::default().build();
        assert_eq!(obj.name(), "distance");

        let obj = ObjectiveKind::Reconstruction(ReconstructionParams::default()).build();
        assert_eq!(obj.name(), "reconstruction");
    }

    #[test]
    fn test_evaluation_non_finite() {
        let ok = Evaluation {
            score: 1.0,
            gradient: array![[0.0, 1.0]],
        };
        assert!(ok.non_finite().is_none());

        let bad = Evaluation {
            score: 1.0,
            gradient: array![[f64::NAN, 1.0]],
        };
        assert_eq!(bad.non_finite(), Some("non-finite gradient"));
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let kind = ObjectiveKind::Distance(DistanceParams {
            weight_power: -1.0,
            ..Default::default()
        });
        assert!(matches!(kind.validate(), Err(PursuitError::Configuration(_))));

        let kind = ObjectiveKind::Reconstruction(ReconstructionParams {
            regularization: -0.5,
            ..Default::default()
        });
        assert!(matches!(kind.validate(), Err(PursuitError::Configuration(_))));
    }
}
