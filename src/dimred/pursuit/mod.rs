//! # Projection pursuit
//!
//! Finds K orthonormal directions in the feature space whose projection of the
//! data minimises a pluggable [`Objective`]. Directions are optimised jointly by
//! Riemannian gradient descent on the set of K × D matrices with orthonormal
//! rows: the gradient is projected onto the tangent space, an Armijo line
//! search picks the step and a QR retraction restores orthonormality.
//!
//! Two entry points:
//!
//! * [`fit`] drives one optimisation for an explicit objective on data used as
//!   given.
//! * [`ProjectionPursuit`] is the estimator: it centres/scales, runs restarts,
//!   keeps the best result and projects new data.

mod engine;
pub mod line_search;
pub mod objective;

pub use engine::{fit, fit_cancellable};
pub use line_search::LineSearchParams;
pub use objective::{
    Decoder, DistanceObjective, DistanceParams, Evaluation, Objective, ObjectiveKind,
    PursuitObjective, ReconstructionObjective, ReconstructionParams,
};

use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::{PursuitError, Result};
use crate::utils::{check_dataset, preprocess, ColumnStats};

/// Starting point of the optimisation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Initialization {
    /// Top-K principal axes of the (preprocessed) data.
    #[default]
    Pca,
    /// Gaussian matrix drawn from `seed`, orthonormalised.
    Random,
    /// Caller supplied K × D matrix of full row rank, orthonormalised.
    Provided(Array2<f64>),
}

/// How a fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FitStatus {
    /// Relative improvement stayed below `tol` for `patience` iterations.
    Converged,
    MaxIterations,
    /// The line search found no decrease, or the accepted step was negligible.
    Stalled,
    /// Only ever seen inside [`crate::error::PartialFit`].
    AbortedNumericalError,
    Cancelled,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitResult {
    /// Orthonormal directions, K × D.
    pub directions: Array2<f64>,
    /// Data projected onto `directions`, N × K.
    pub projected: Array2<f64>,
    pub score: f64,
    pub initial_score: f64,
    /// Accepted steps.
    pub iterations: usize,
    pub status: FitStatus,
    /// Score after initialisation and after every accepted step; non-increasing.
    pub score_history: Vec<f64>,
}

/// Projection pursuit settings
///
/// ### Fields
///
/// * `n_components` - Number of directions K.
/// * `objective` - Objective and its hyperparameters.
/// * `initialization` - Starting directions of the first restart.
/// * `center` - Subtract column means before fitting.
/// * `scale` - Divide columns by their standard deviation before fitting.
/// * `learning_rate` - Initial line search step.
/// * `max_iter` - Maximum outer iterations.
/// * `tol` - Relative improvement below which an iteration counts as quiet.
/// * `patience` - Consecutive quiet iterations before convergence.
/// * `min_step_norm` - Step norm below which the fit is stalled.
/// * `line_search` - Backtracking parameters.
/// * `n_init` - Number of restarts. Restarts after the first start from
///   random directions.
/// * `seed` - Seed of all randomness.
/// * `verbose` - Log every iteration at info level.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PursuitConfig {
    pub n_components: usize,
    pub objective: ObjectiveKind,
    pub initialization: Initialization,
    pub center: bool,
    pub scale: bool,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub patience: usize,
    pub min_step_norm: f64,
    pub line_search: LineSearchParams,
    pub n_init: usize,
    pub seed: u64,
    pub verbose: bool,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            objective: ObjectiveKind::default(),
            initialization: Initialization::Pca,
            center: true,
            scale: true,
            learning_rate: 1.0,
            max_iter: 500,
            tol: 1e-6,
            patience: 5,
            min_step_norm: 1e-10,
            line_search: LineSearchParams::default(),
            n_init: 1,
            seed: 42,
            verbose: false,
        }
    }
}

impl PursuitConfig {
    /// Check every setting that does not depend on the dataset.
    pub fn validate(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(PursuitError::config("n_components must be at least 1"));
        }
        self.objective.validate()?;
        self.validate_optimiser()
    }

    pub(crate) fn validate_optimiser(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PursuitError::config(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if self.max_iter == 0 {
            return Err(PursuitError::config("max_iter must be at least 1"));
        }
        if !(self.tol >= 0.0 && self.tol.is_finite()) {
            return Err(PursuitError::config(format!(
                "tol must be finite and >= 0, got {}",
                self.tol
            )));
        }
        if self.patience == 0 {
            return Err(PursuitError::config("patience must be at least 1"));
        }
        if !(self.min_step_norm >= 0.0 && self.min_step_norm.is_finite()) {
            return Err(PursuitError::config(format!(
                "min_step_norm must be finite and >= 0, got {}",
                self.min_step_norm
            )));
        }
        if self.n_init == 0 {
            return Err(PursuitError::config("n_init must be at least 1"));
        }
        self.line_search.validate()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PursuitConfigBuilder {
    config: PursuitConfig,
}

impl PursuitConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.config.n_components = n_components;
        self
    }

    pub fn objective(mut self, objective: ObjectiveKind) -> Self {
        self.config.objective = objective;
        self
    }

    pub fn initialization(mut self, initialization: Initialization) -> Self {
        self.config.initialization = initialization;
        self
    }

    pub fn center(mut self, center: bool) -> Self {
        self.config.center = center;
        self
    }

    pub fn scale(mut self, scale: bool) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.config.learning_rate = learning_rate;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    pub fn patience(mut self, patience: usize) -> Self {
        self.config.patience = patience;
        self
    }

    pub fn min_step_norm(mut self, min_step_norm: f64) -> Self {
        self.config.min_step_norm = min_step_norm;
        self
    }

    pub fn line_search(mut self, line_search: LineSearchParams) -> Self {
        self.config.line_search = line_search;
        self
    }

    pub fn n_init(mut self, n_init: usize) -> Self {
        self.config.n_init = n_init;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    pub fn build(self) -> Result<PursuitConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Projection pursuit estimator.
///
/// Keeps the preprocessing statistics of the training data so that
/// [`ProjectionPursuit::transform`] projects new samples the same way.
pub struct ProjectionPursuit {
    config: PursuitConfig,
    cancel: Option<Arc<AtomicBool>>,
    stats: Option<ColumnStats>,
    result: Option<FitResult>,
}

impl ProjectionPursuit {
    pub fn new(config: PursuitConfig) -> Self {
        Self {
            config,
            cancel: None,
            stats: None,
            result: None,
        }
    }

    /// Stop fitting once `flag` is set. Checked between outer iterations.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        self.config.validate()?;
        check_dataset(x)?;

        let stats = ColumnStats::from_data(x)?;
        let data = preprocess(
            x,
            self.config.center.then_some(&stats.mean),
            self.config.scale.then_some(&stats.std_dev),
        );

        let runs = self.restart_plan();
        let k = self.config.n_components;
        let cancel = self.cancel.as_deref();

        let outcomes: Vec<Result<FitResult>> = runs
            .into_par_iter()
            .map(|(initialization, seed)| {
                let config = PursuitConfig {
                    initialization,
                    seed,
                    ..self.config.clone()
                };
                let mut objective = config.objective.build();
                engine::fit_cancellable(data.view(), k, &mut objective, &config, cancel)
            })
            .collect();

        let mut best: Option<(usize, FitResult)> = None;
        let mut first_error = None;
        for (run, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(result) => {
                    if best.as_ref().map_or(true, |(_, b)| result.score < b.score) {
                        best = Some((run, result));
                    }
                }
                Err(e) => {
                    warn!("restart {} failed: {}", run, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let (run, result) = match (best, first_error) {
            (Some(best), _) => best,
            (None, Some(e)) => return Err(e),
            (None, None) => return Err(PursuitError::config("no restarts were run")),
        };

        if self.config.n_init > 1 {
            info!(
                "best of {} restarts: #{} with score {:.6e}",
                self.config.n_init, run, result.score
            );
        }

        self.stats = Some(stats);
        self.result = Some(result);
        Ok(())
    }

    /// Initialisation and seed of every restart. The first restart honours
    /// the configured initialisation, the others start from seeded random
    /// directions.
    fn restart_plan(&self) -> Vec<(Initialization, u64)> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut runs = vec![(self.config.initialization.clone(), self.config.seed)];
        for _ in 1..self.config.n_init {
            runs.push((Initialization::Random, rng.next_u64()));
        }
        runs
    }

    /// Project `x` (M × D) with the fitted directions after applying the
    /// training preprocessing.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (stats, result) = match (&self.stats, &self.result) {
            (Some(stats), Some(result)) => (stats, result),
            _ => return Err(PursuitError::config("projection pursuit has not been fitted")),
        };
        if x.ncols() != result.directions.ncols() {
            return Err(PursuitError::config(format!(
                "expected {} features, got {}",
                result.directions.ncols(),
                x.ncols()
            )));
        }

        let data = preprocess(
            x,
            self.config.center.then_some(&stats.mean),
            self.config.scale.then_some(&stats.std_dev),
        );
        Ok(data.dot(&result.directions.t()))
    }

    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        match &self.result {
            Some(result) => Ok(result.projected.clone()),
            None => Err(PursuitError::config("projection pursuit has not been fitted")),
        }
    }

    pub fn result(&self) -> Option<&FitResult> {
        self.result.as_ref()
    }

    pub fn directions(&self) -> Option<&Array2<f64>> {
        self.result.as_ref().map(|r| &r.directions)
    }

    /// Training column statistics, available after `fit`.
    pub fn column_stats(&self) -> Option<&ColumnStats> {
        self.stats.as_ref()
    }
}
