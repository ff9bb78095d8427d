mod commons;
use commons::*;

use ndarray::{Array2, Axis};
use projection_pursuit::dimred::pca::top_variance_directions;
use projection_pursuit::dimred::pursuit::{
    fit, DistanceObjective, ReconstructionObjective, Objective,
};
use projection_pursuit::metrics::{linear_reconstruction_error, silhouette, trustworthiness};
use projection_pursuit::utils::{is_orthonormal, preprocess};
use projection_pursuit::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn linear_exact() -> ReconstructionParams {
    ReconstructionParams {
        decoder: Decoder::Linear,
        regularization: 0.0,
    }
}

fn centred(x: &Array2<f64>) -> Array2<f64> {
    let mean = x.mean_axis(Axis(0)).unwrap();
    preprocess(x.view(), Some(&mean), None)
}

#[test]
fn pursuit_01_directions_are_orthonormal() -> anyhow::Result<()> {
    init_logging();
    let (x, _) = create_cluster_data(20, 5, 42);

    for k in [1, 2, 5] {
        for objective in [
            ObjectiveKind::default(),
            ObjectiveKind::Reconstruction(ReconstructionParams::default()),
        ] {
            let config = PursuitConfigBuilder::new()
                .n_components(k)
                .objective(objective)
                .max_iter(50)
                .build()?;
            let mut pp = ProjectionPursuit::new(config);
            let projected = pp.fit_transform(x.view())?;
            let result = pp.result().unwrap();

            assert_eq!(result.directions.dim(), (k, 5));
            assert_eq!(projected.dim(), (100, k));
            assert!(is_orthonormal(result.directions.view(), 1e-8));
            assert_ne!(result.status, FitStatus::AbortedNumericalError);
        }
    }
    Ok(())
}

#[test]
fn pursuit_02_invalid_k_is_a_configuration_error() {
    init_logging();
    let x = create_noise_data(30, 4, 1);
    let config = PursuitConfig::default();

    let mut obj = DistanceObjective::new(DistanceParams::default());
    assert!(matches!(
        fit(x.view(), 0, &mut obj, &config),
        Err(PursuitError::Configuration(_))
    ));
    assert!(matches!(
        fit(x.view(), 5, &mut obj, &config),
        Err(PursuitError::Configuration(_))
    ));

    let mut pp = ProjectionPursuit::new(PursuitConfig {
        n_components: 5,
        ..Default::default()
    });
    assert!(matches!(pp.fit(x.view()), Err(PursuitError::Configuration(_))));
    assert!(pp.result().is_none());
}

#[test]
fn pursuit_03_too_few_distinct_points() {
    init_logging();
    // only two distinct points, K = 2 needs three
    let x = Array2::from_shape_fn((10, 3), |(i, j)| if i % 2 == 0 { j as f64 } else { 1.0 });
    let mut obj = DistanceObjective::new(DistanceParams::default());

    let err = fit(x.view(), 2, &mut obj, &PursuitConfig::default()).unwrap_err();
    match err {
        PursuitError::InsufficientData { distinct, required } => {
            assert_eq!(distinct, 2);
            assert_eq!(required, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    // K = 1 only needs two
    assert!(fit(x.view(), 1, &mut obj, &PursuitConfig::default()).is_ok());
}

#[test]
fn pursuit_04_non_finite_data_is_rejected() {
    init_logging();
    let mut x = create_noise_data(20, 3, 2);
    x[[4, 1]] = f64::NAN;
    let mut pp = ProjectionPursuit::new(PursuitConfig::default());
    assert!(matches!(pp.fit(x.view()), Err(PursuitError::Configuration(_))));
}

#[test]
fn pursuit_05_fits_are_deterministic() -> anyhow::Result<()> {
    init_logging();
    let (x, _) = create_cluster_data(15, 6, 7);
    let config = PursuitConfigBuilder::new()
        .initialization(Initialization::Random)
        .seed(11)
        .n_init(2)
        .max_iter(60)
        .build()?;

    let mut a = ProjectionPursuit::new(config.clone());
    a.fit(x.view())?;
    let mut b = ProjectionPursuit::new(config);
    b.fit(x.view())?;

    let (ra, rb) = (a.result().unwrap(), b.result().unwrap());
    assert_eq!(ra.directions, rb.directions);
    assert_eq!(ra.score_history, rb.score_history);
    assert_eq!(ra.status, rb.status);
    Ok(())
}

#[test]
fn pursuit_06_score_history_never_increases() -> anyhow::Result<()> {
    init_logging();
    let (x, _) = create_cluster_data(20, 5, 3);

    for objective in [
        ObjectiveKind::Distance(DistanceParams {
            weight_power: 1.0,
            ..Default::default()
        }),
        ObjectiveKind::Reconstruction(ReconstructionParams::default()),
    ] {
        let config = PursuitConfigBuilder::new()
            .objective(objective)
            .initialization(Initialization::Random)
            .max_iter(40)
            .build()?;
        let mut pp = ProjectionPursuit::new(config);
        pp.fit(x.view())?;
        let result = pp.result().unwrap();

        assert_eq!(result.score_history.len(), result.iterations + 1);
        assert_eq!(result.score_history[0], result.initial_score);
        assert_eq!(*result.score_history.last().unwrap(), result.score);
        for pair in result.score_history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12 * pair[0].abs());
        }
    }
    Ok(())
}

#[test]
fn pursuit_07_subspace_data_is_recovered_immediately() -> anyhow::Result<()> {
    init_logging();
    let x = create_subspace_data(40, 5, 2, 5);
    let config = PursuitConfigBuilder::new()
        .initialization(Initialization::Provided(axis_basis(2, 5)))
        .build()?;
    let mut obj = DistanceObjective::new(DistanceParams::default());

    let result = fit(x.view(), 2, &mut obj, &config)?;
    assert!(result.initial_score < 1e-12);
    assert!(result.score < 1e-12);
    assert!(result.iterations <= 1);
    assert!(matches!(
        result.status,
        FitStatus::Stalled | FitStatus::Converged
    ));
    Ok(())
}

#[test]
fn pursuit_08_distance_fit_improves_on_start() -> anyhow::Result<()> {
    init_logging();
    // 100 points in five clusters, 5 features
    let (x, _) = create_cluster_data(20, 5, 42);
    assert_eq!(x.dim(), (100, 5));

    for initialization in [Initialization::Pca, Initialization::Random] {
        let config = PursuitConfigBuilder::new()
            .initialization(initialization)
            .build()?;
        let mut pp = ProjectionPursuit::new(config);
        pp.fit(x.view())?;
        let result = pp.result().unwrap();

        assert!(matches!(
            result.status,
            FitStatus::Converged | FitStatus::MaxIterations
        ));
        assert!(result.score < result.initial_score);
        assert_eq!(result.directions.dim(), (2, 5));
        assert!(is_orthonormal(result.directions.view(), 1e-8));
    }
    Ok(())
}

#[test]
fn pursuit_09_reconstruction_matches_pca_baseline() -> anyhow::Result<()> {
    init_logging();
    let (raw, _) = create_cluster_data(20, 5, 9);
    let x = centred(&raw);

    let pca = top_variance_directions(x.view(), 2)?;
    let baseline = linear_reconstruction_error(x.view(), pca.view())?;

    let config = PursuitConfigBuilder::new().max_iter(100).build()?;

    // linear inverse map: PCA is already optimal, pursuit must not lose ground
    let mut linear = ReconstructionObjective::new(linear_exact());
    let result = fit(x.view(), 2, &mut linear, &config)?;
    let mse = linear.mean_squared_error(result.projected.view())?;
    assert!(mse <= baseline * (1.0 + 1e-8) + 1e-12);

    // non-linear inverse map: at most the baseline plus the ridge penalty
    let mut tanh = ReconstructionObjective::new(ReconstructionParams::default());
    let result = fit(x.view(), 2, &mut tanh, &config)?;
    let mse = tanh.mean_squared_error(result.projected.view())?;
    assert!(mse <= baseline + 1e-4);
    assert_eq!(tanh.name(), "reconstruction");
    Ok(())
}

#[test]
fn pursuit_10_full_rank_reconstruction_is_exact() -> anyhow::Result<()> {
    init_logging();
    let x = centred(&create_noise_data(30, 4, 4));
    let config = PursuitConfigBuilder::new().max_iter(10).build()?;

    let mut obj = ReconstructionObjective::new(linear_exact());
    let result = fit(x.view(), 4, &mut obj, &config)?;

    assert!(obj.mean_squared_error(result.projected.view())? < 1e-10);
    assert!(is_orthonormal(result.directions.view(), 1e-8));
    Ok(())
}

#[test]
fn pursuit_11_cancelled_fit_keeps_valid_directions() -> anyhow::Result<()> {
    init_logging();
    let (x, _) = create_cluster_data(10, 4, 1);
    let flag = Arc::new(AtomicBool::new(true));

    let mut pp = ProjectionPursuit::new(PursuitConfig::default()).with_cancel(flag);
    pp.fit(x.view())?;
    let result = pp.result().unwrap();

    assert_eq!(result.status, FitStatus::Cancelled);
    assert_eq!(result.iterations, 0);
    assert!(is_orthonormal(result.directions.view(), 1e-10));
    Ok(())
}

#[test]
fn pursuit_12_restarts_keep_the_best_run() -> anyhow::Result<()> {
    init_logging();
    let (x, _) = create_cluster_data(15, 5, 21);
    let base = PursuitConfigBuilder::new()
        .initialization(Initialization::Random)
        .max_iter(80);

    let mut single = ProjectionPursuit::new(base.clone().build()?);
    single.fit(x.view())?;
    let mut multi = ProjectionPursuit::new(base.n_init(4).build()?);
    multi.fit(x.view())?;

    assert!(multi.result().unwrap().score <= single.result().unwrap().score);
    Ok(())
}

#[test]
fn pursuit_13_embedding_quality_metrics() -> anyhow::Result<()> {
    init_logging();
    let (x, labels) = create_cluster_data(20, 5, 42);
    let config = PursuitConfigBuilder::new().scale(false).build()?;
    let mut pp = ProjectionPursuit::new(config);
    let embedded = pp.fit_transform(x.view())?;

    let t = trustworthiness(x.view(), embedded.view(), 5)?;
    assert!((0.0..=1.0).contains(&t));

    let s = silhouette(embedded.view(), &labels)?;
    assert!((-1.0..=1.0).contains(&s));
    Ok(())
}

#[test]
fn pursuit_14_numerical_instability_carries_partial_fit() {
    init_logging();
    let err = PursuitError::NumericalInstability(Box::new(PartialFit {
        directions: axis_basis(1, 3),
        score: 0.5,
        iteration: 3,
        status: FitStatus::AbortedNumericalError,
        reason: "non-finite score".to_string(),
    }));

    let partial = err.partial_fit().unwrap();
    assert_eq!(partial.iteration, 3);
    assert!(err.to_string().contains("non-finite score"));
    assert!(PursuitError::SingularSystem("x".into()).partial_fit().is_none());
}
