use log::{debug, info, log, warn, Level};
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::atomic::{AtomicBool, Ordering};

use super::line_search::{backtracking, tangent_projection};
use super::objective::{Evaluation, Objective};
use super::{FitResult, FitStatus, Initialization, PursuitConfig};
use crate::dimred::pca::top_variance_directions;
use crate::error::{PartialFit, PursuitError, Result};
use crate::utils::{check_dataset, count_distinct_rows, is_orthonormal, orthonormalize_rows};

/// Denominator floor of the relative improvement.
const MIN_SCALE: f64 = 1e-12;

/// Run projection pursuit on `data` (N × D) for `k` directions.
///
/// `data` is used as given; centring and scaling are the caller's business
/// (see [`super::ProjectionPursuit`] for an estimator that does both). `k`
/// takes precedence over `config.n_components` and `objective` over
/// `config.objective`.
///
/// ### Params
///
/// * `data` - Dataset, never mutated.
/// * `k` - Number of directions, `1..=D`.
/// * `objective` - Objective to minimise. It is (re-)initialised here.
/// * `config` - Optimiser, initialisation and stopping settings.
///
/// ### Returns
///
/// The [`FitResult`], or a configuration / data / numerical error. Shape and
/// configuration problems are reported before any optimisation work.
pub fn fit<O: Objective>(
    data: ArrayView2<f64>,
    k: usize,
    objective: &mut O,
    config: &PursuitConfig,
) -> Result<FitResult> {
    fit_cancellable(data, k, objective, config, None)
}

/// [`fit`] with a cancellation flag, checked between outer iterations only.
pub fn fit_cancellable<O: Objective>(
    data: ArrayView2<f64>,
    k: usize,
    objective: &mut O,
    config: &PursuitConfig,
    cancel: Option<&AtomicBool>,
) -> Result<FitResult> {
    check_dataset(data)?;
    let (n, d) = data.dim();
    if k == 0 || k > d {
        return Err(PursuitError::config(format!(
            "number of directions must be in 1..={}, got {}",
            d, k
        )));
    }
    config.validate_optimiser()?;

    let distinct = count_distinct_rows(data);
    if distinct < k + 1 {
        return Err(PursuitError::InsufficientData {
            distinct,
            required: k + 1,
        });
    }

    let initial = initial_directions(data, k, &config.initialization, config.seed)?;
    objective.initialize(data, k)?;

    info!(
        "Projection pursuit: {} samples × {} features -> {} directions, {} objective",
        n,
        d,
        k,
        objective.name()
    );

    let result = optimise(data, objective, config, initial, cancel)?;

    info!(
        "Projection pursuit finished: {:?} after {} iterations, score {:.6e} (initial {:.6e})",
        result.status, result.iterations, result.score, result.initial_score
    );

    Ok(result)
}

/// Initial orthonormal direction set (k × D).
pub(crate) fn initial_directions(
    data: ArrayView2<f64>,
    k: usize,
    init: &Initialization,
    seed: u64,
) -> Result<Array2<f64>> {
    let d = data.ncols();
    let raw = match init {
        Initialization::Pca => top_variance_directions(data, k)?,
        Initialization::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            Array2::from_shape_simple_fn((k, d), || StandardNormal.sample(&mut rng))
        }
        Initialization::Provided(w) => {
            if w.dim() != (k, d) {
                return Err(PursuitError::config(format!(
                    "provided directions must be {} × {}, got {} × {}",
                    k,
                    d,
                    w.nrows(),
                    w.ncols()
                )));
            }
            w.clone()
        }
    };

    orthonormalize_rows(raw.view()).ok_or_else(|| {
        PursuitError::config("initial directions are linearly dependent or not finite")
    })
}

fn instability(directions: &Array2<f64>, score: f64, iteration: usize, reason: &str) -> PursuitError {
    PursuitError::NumericalInstability(Box::new(PartialFit {
        directions: directions.clone(),
        score,
        iteration,
        status: FitStatus::AbortedNumericalError,
        reason: reason.to_string(),
    }))
}

/// Refresh the objective for `directions` and evaluate it.
fn evaluate_at<O: Objective>(
    data: ArrayView2<f64>,
    objective: &mut O,
    directions: &Array2<f64>,
) -> Result<(Array2<f64>, Evaluation)> {
    let projected = data.dot(&directions.t());
    objective.refresh(data, projected.view())?;
    let evaluation = objective.evaluate(projected.view())?;
    Ok((projected, evaluation))
}

/// Outer loop: project, refresh, evaluate, step, re-orthonormalise, test.
fn optimise<O: Objective>(
    data: ArrayView2<f64>,
    objective: &mut O,
    config: &PursuitConfig,
    initial: Array2<f64>,
    cancel: Option<&AtomicBool>,
) -> Result<FitResult> {
    let level = if config.verbose { Level::Info } else { Level::Debug };

    let mut directions = initial;
    let (mut projected, mut evaluation) = evaluate_at(data, objective, &directions)?;
    if let Some(reason) = evaluation.non_finite() {
        return Err(instability(&directions, evaluation.score, 0, reason));
    }

    let initial_score = evaluation.score;
    let mut score_history = vec![initial_score];
    let mut step_size = config.learning_rate;
    let mut quiet = 0;
    let mut iterations = 0;
    let mut status = FitStatus::MaxIterations;

    log!(level, "iter 0: score = {:.6e}", initial_score);

    for iter in 1..=config.max_iter {
        if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            info!("Projection pursuit cancelled before iteration {}", iter);
            status = FitStatus::Cancelled;
            break;
        }

        // dS/dW = (dS/dZ)^T X, then onto the tangent space at W
        let euclidean = evaluation.gradient.t().dot(&data);
        let xi = tangent_projection(directions.view(), euclidean.view());
        if xi.iter().any(|v| !v.is_finite()) {
            return Err(instability(
                &directions,
                evaluation.score,
                iterations,
                "non-finite direction gradient",
            ));
        }

        let step = {
            let frozen: &O = objective;
            backtracking(
                &config.line_search,
                directions.view(),
                xi.view(),
                evaluation.score,
                step_size,
                |trial| frozen.score(data.dot(&trial.t()).view()),
            )?
        };

        let Some(step) = step else {
            warn!(
                "line search found no decrease at iteration {} (score {:.6e})",
                iter, evaluation.score
            );
            status = FitStatus::Stalled;
            break;
        };

        if step.norm < config.min_step_norm {
            log!(
                level,
                "iter {}: step norm {:.3e} below {:.3e}, stalled",
                iter,
                step.norm,
                config.min_step_norm
            );
            status = FitStatus::Stalled;
            break;
        }

        let (next_projected, next) = evaluate_at(data, objective, &step.directions)?;
        if let Some(reason) = next.non_finite() {
            return Err(instability(&directions, evaluation.score, iterations, reason));
        }

        let improvement =
            (evaluation.score - next.score) / evaluation.score.abs().max(MIN_SCALE);

        directions = step.directions;
        projected = next_projected;
        evaluation = next;
        iterations = iter;
        score_history.push(evaluation.score);
        step_size = (step.alpha * config.line_search.growth).min(config.line_search.max_step);

        debug_assert!(is_orthonormal(directions.view(), 1e-8));
        log!(
            level,
            "iter {}: score = {:.6e}, rel. improvement = {:.3e}, alpha = {:.3e}, step = {:.3e}",
            iter,
            evaluation.score,
            improvement,
            step.alpha,
            step.norm
        );

        if improvement < config.tol {
            quiet += 1;
            if quiet >= config.patience {
                status = FitStatus::Converged;
                break;
            }
        } else {
            quiet = 0;
        }
    }

    if status == FitStatus::MaxIterations {
        debug!("reached max_iter = {}", config.max_iter);
    }

    Ok(FitResult {
        directions,
        projected,
        score: evaluation.score,
        initial_score,
        iterations,
        status,
        score_history,
    })
}
