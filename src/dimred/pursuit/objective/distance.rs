use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use super::{check_components, check_projected, Evaluation, Objective};
use crate::error::{PursuitError, Result};
use crate::utils::pairwise_distances;

/// Distance objective parameters
///
/// ### Fields
///
/// * `weight_power` - Pair weights are `1 / (d_ij + epsilon)^weight_power`.
///   `0` weighs all pairs equally, `1` gives Sammon's stress, larger values
///   emphasise local structure.
/// * `epsilon` - Additive guard in the weight denominator.
/// * `degenerate_tol` - Original distances at or below this value mark
///   coincident points; those pairs are excluded. Projected distances below it
///   contribute no gradient.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceParams {
    pub weight_power: f64,
    pub epsilon: f64,
    pub degenerate_tol: f64,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            weight_power: 0.0,
            epsilon: 1e-8,
            degenerate_tol: 1e-12,
        }
    }
}

impl DistanceParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.weight_power.is_finite() && self.weight_power >= 0.0) {
            return Err(PursuitError::config(format!(
                "weight_power must be finite and >= 0, got {}",
                self.weight_power
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(PursuitError::config(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        if !(self.degenerate_tol.is_finite() && self.degenerate_tol >= 0.0) {
            return Err(PursuitError::config(format!(
                "degenerate_tol must be finite and >= 0, got {}",
                self.degenerate_tol
            )));
        }
        Ok(())
    }
}

/// Cached original-space geometry, built once per fit.
#[derive(Debug, Clone)]
struct DistanceState {
    distances: Array2<f64>,
    /// Zero for degenerate pairs and on the diagonal.
    weights: Array2<f64>,
    /// `sum_{i<j} w_ij d_ij^2`, makes the score scale free.
    normaliser: f64,
    n_components: usize,
}

/// Weighted stress between original and projected pairwise distances
///
/// `S = sum_{i<j} w_ij (d_ij - delta_ij)^2 / sum_{i<j} w_ij d_ij^2`
///
/// where `d` are distances in the original space and `delta` distances
/// between projected coordinates. The score is 0 exactly when every
/// non-degenerate distance is preserved.
#[derive(Debug, Clone)]
pub struct DistanceObjective {
    params: DistanceParams,
    state: Option<DistanceState>,
}

impl DistanceObjective {
    pub fn new(params: DistanceParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &DistanceParams {
        &self.params
    }

    /// Cached original distances, available after `initialize`.
    pub fn original_distances(&self) -> Option<&Array2<f64>> {
        self.state.as_ref().map(|s| &s.distances)
    }

    fn state(&self) -> Result<&DistanceState> {
        self.state
            .as_ref()
            .ok_or_else(|| PursuitError::config("distance objective used before initialize"))
    }

    /// Per-row contributions of the pairs `(i, j > i)` and, if `gradient` is
    /// given, the unnormalised gradient rows. Rows are processed in parallel
    /// and summed in order.
    fn accumulate(
        &self,
        state: &DistanceState,
        projected: ArrayView2<f64>,
        gradient: Option<&mut Array2<f64>>,
    ) -> f64 {
        let n = projected.nrows();
        let tol = self.params.degenerate_tol;

        let row_pair = |i: usize, mut grad_row: Option<ndarray::ArrayViewMut1<f64>>| -> f64 {
            let zi = projected.row(i);
            let mut partial = 0.0;
            for j in 0..n {
                let w = state.weights[[i, j]];
                if w == 0.0 {
                    continue;
                }
                let zj = projected.row(j);
                let delta = zi
                    .iter()
                    .zip(zj.iter())
                    .map(|(&a, &b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                let diff = delta - state.distances[[i, j]];
                if j > i {
                    partial += w * diff * diff;
                }
                if let Some(g) = grad_row.as_mut() {
                    if delta > tol {
                        let coef = 2.0 * w * diff / delta;
                        for (gk, (&a, &b)) in g.iter_mut().zip(zi.iter().zip(zj.iter())) {
                            *gk += coef * (a - b);
                        }
                    }
                }
            }
            partial
        };

        let partials: Vec<f64> = match gradient {
            Some(grad) => grad
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .map(|(i, row)| row_pair(i, Some(row)))
                .collect(),
            None => (0..n).into_par_iter().map(|i| row_pair(i, None)).collect(),
        };

        partials.iter().sum()
    }
}

impl Objective for DistanceObjective {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn initialize(&mut self, data: ArrayView2<f64>, n_components: usize) -> Result<()> {
        self.state = None;
        self.params.validate()?;
        check_components(n_components, data.ncols())?;

        let distances = pairwise_distances(data);
        let p = self.params.weight_power;
        let eps = self.params.epsilon;
        let tol = self.params.degenerate_tol;

        let mut weights = Array2::zeros(distances.dim());
        let mut normaliser = 0.0;
        for ((i, j), &d) in distances.indexed_iter() {
            if i != j && d > tol {
                let w = if p == 0.0 { 1.0 } else { (d + eps).powf(p).recip() };
                weights[[i, j]] = w;
                if j > i {
                    normaliser += w * d * d;
                }
            }
        }

        if !(normaliser > 0.0 && normaliser.is_finite()) {
            return Err(PursuitError::InsufficientData {
                distinct: 1,
                required: 2,
            });
        }

        self.state = Some(DistanceState {
            distances,
            weights,
            normaliser,
            n_components,
        });
        Ok(())
    }

    fn evaluate(&self, projected: ArrayView2<f64>) -> Result<Evaluation> {
        let state = self.state()?;
        check_projected(projected, state.distances.nrows(), state.n_components)?;

        let mut gradient = Array2::zeros(projected.dim());
        let raw = self.accumulate(state, projected, Some(&mut gradient));
        gradient.mapv_inplace(|g| g / state.normaliser);

        Ok(Evaluation {
            score: raw / state.normaliser,
            gradient,
        })
    }

    fn score(&self, projected: ArrayView2<f64>) -> Result<f64> {
        let state = self.state()?;
        check_projected(projected, state.distances.nrows(), state.n_components)?;
        Ok(self.accumulate(state, projected, None) / state.normaliser)
    }
}
