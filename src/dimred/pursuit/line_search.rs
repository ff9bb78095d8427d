use log::trace;
use ndarray::{Array2, ArrayView2};

use crate::error::{PursuitError, Result};
use crate::utils::orthonormalize_rows;

/// Backtracking line search parameters
///
/// ### Fields
///
/// * `shrink` - Factor applied to the step after a rejected trial, in (0, 1).
/// * `growth` - Factor applied to the accepted step to seed the next
///   iteration, >= 1.
/// * `armijo` - Sufficient decrease constant `c1`, in (0, 1).
/// * `max_backtracks` - Rejected trials allowed before giving up.
/// * `max_step` - Upper bound on the adaptive step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSearchParams {
    pub shrink: f64,
    pub growth: f64,
    pub armijo: f64,
    pub max_backtracks: usize,
    pub max_step: f64,
}

impl Default for LineSearchParams {
    fn default() -> Self {
        Self {
            shrink: 0.5,
            growth: 2.0,
            armijo: 1e-4,
            max_backtracks: 30,
            max_step: 1e3,
        }
    }
}

impl LineSearchParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(PursuitError::config(format!(
                "line search shrink must be in (0, 1), got {}",
                self.shrink
            )));
        }
        if !(self.growth >= 1.0 && self.growth.is_finite()) {
            return Err(PursuitError::config(format!(
                "line search growth must be finite and >= 1, got {}",
                self.growth
            )));
        }
        if !(self.armijo > 0.0 && self.armijo < 1.0) {
            return Err(PursuitError::config(format!(
                "Armijo constant must be in (0, 1), got {}",
                self.armijo
            )));
        }
        if !(self.max_step > 0.0 && self.max_step.is_finite()) {
            return Err(PursuitError::config(format!(
                "max_step must be finite and > 0, got {}",
                self.max_step
            )));
        }
        Ok(())
    }
}

/// An accepted step.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    /// Orthonormal directions after the step.
    pub directions: Array2<f64>,
    pub alpha: f64,
    /// `||directions - current||_F`
    pub norm: f64,
}

/// Project a Euclidean gradient onto the tangent space of the set of
/// matrices with orthonormal rows at `w`: `G - sym(G W^T) W`.
pub(crate) fn tangent_projection(w: ArrayView2<f64>, grad: ArrayView2<f64>) -> Array2<f64> {
    let gw = grad.dot(&w.t());
    let sym = (&gw + &gw.t()) * 0.5;
    &grad - &sym.dot(&w)
}

/// Armijo backtracking along `-xi`, retracting every trial onto the
/// orthonormal set.
///
/// `score_of` evaluates a trial direction matrix. Trials that cannot be
/// orthonormalised or score non-finite are rejected like any other trial.
/// Returns `None` when no trial within `max_backtracks` satisfies the
/// sufficient decrease condition.
pub(crate) fn backtracking<F>(
    params: &LineSearchParams,
    current: ArrayView2<f64>,
    xi: ArrayView2<f64>,
    score0: f64,
    alpha0: f64,
    mut score_of: F,
) -> Result<Option<Step>>
where
    F: FnMut(ArrayView2<f64>) -> Result<f64>,
{
    let slope = xi.iter().map(|v| v * v).sum::<f64>();
    let mut alpha = alpha0;

    for attempt in 0..=params.max_backtracks {
        let raw = &current - &(&xi * alpha);
        if let Some(trial) = orthonormalize_rows(raw.view()) {
            let score = score_of(trial.view())?;
            if score.is_finite() && score <= score0 - params.armijo * alpha * slope {
                let norm = (&trial - &current).iter().map(|v| v * v).sum::<f64>().sqrt();
                return Ok(Some(Step {
                    directions: trial,
                    alpha,
                    norm,
                }));
            }
            trace!(
                "line search trial {} rejected: alpha = {:.3e}, score = {:.6e}",
                attempt,
                alpha,
                score
            );
        } else {
            trace!(
                "line search trial {} rejected: alpha = {:.3e}, rank deficient",
                attempt,
                alpha
            );
        }
        alpha *= params.shrink;
    }

    Ok(None)
}
