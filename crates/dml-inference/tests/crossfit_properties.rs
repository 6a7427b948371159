//! Harness properties: record ordering, clipping, determinism, degenerate
//! final stages and the IIVM compliance restrictions.

use approx::assert_abs_diff_eq;
use dml_core::{DmlData, Error, FoldPartition, Learner, Matrix, OutputKind, Predictor, Result};
use dml_inference::{
    CrossFitRecords, DmlConfig, DoubleMl, Iivm, IivmOptions, Irm, Model, ModelKind, Pliv, Plr,
    SimulationConfig, cross_fit, simulate,
};
use dml_learners::{ConstantMean, LearnerKind, LinearRegression, RandomForest};
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Probability learner whose predictions leave `[0, 1]` on purpose.
struct OutOfRange;

struct OutOfRangeModel;

impl Learner for OutOfRange {
    fn name(&self) -> &str {
        "out_of_range"
    }

    fn output(&self) -> OutputKind {
        OutputKind::Probability
    }

    fn fit(&self, _x: &Matrix, _y: &[f64], _rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(OutOfRangeModel))
    }
}

impl Predictor for OutOfRangeModel {
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        Ok((0..x.nrows()).map(|i| if i % 2 == 0 { -0.4 } else { 1.7 }).collect())
    }
}

/// Learner whose predictor evaluates a fixed formula on every row.
struct Formula {
    output: OutputKind,
    f: fn(&[f64]) -> f64,
}

struct FormulaModel(fn(&[f64]) -> f64);

impl Learner for Formula {
    fn name(&self) -> &str {
        "formula"
    }

    fn output(&self) -> OutputKind {
        self.output
    }

    fn fit(&self, _x: &Matrix, _y: &[f64], _rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        Ok(Box::new(FormulaModel(self.f)))
    }
}

impl Predictor for FormulaModel {
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        Ok((0..x.nrows()).map(|i| (self.0)(x.row(i))).collect())
    }
}

fn ols() -> Box<dyn Learner> {
    Box::new(LinearRegression::new())
}

fn mean() -> Box<dyn Learner> {
    Box::new(ConstantMean::regressor())
}

fn fixed_partition(n: usize) -> FoldPartition {
    FoldPartition::from_assignment((0..n).map(|i| (i * 7 + 1) % 3).collect(), 3).unwrap()
}

fn sim(model: ModelKind, n_obs: usize, seed: u64) -> DmlData {
    simulate(&SimulationConfig { model, n_obs, n_features: 4, theta: 0.5, seed }).unwrap()
}

#[test]
fn test_indices_cover_every_unit_once() {
    let data = sim(ModelKind::Pliv, 61, 3);
    let partition = fixed_partition(61);
    let ml_r = Box::new(LinearRegression::linear_probability());
    let model = Model::Pliv(Pliv::new(ols(), ols(), ml_r));
    let mut rng = StdRng::seed_from_u64(0);
    let recs = cross_fit(&data, &model, &partition, &mut rng, false).unwrap();
    assert_eq!(recs.indices(), (0..61).collect::<Vec<_>>());
    assert_eq!(recs.len(), 61);
}

#[test]
fn test_records_come_from_heldout_fold() {
    // With the mean stub, l_hat of unit i is the mean of Y outside i's fold.
    let data = sim(ModelKind::Plr, 30, 8);
    let partition = fixed_partition(30);
    let model = Model::Plr(Plr::new(mean(), mean()));
    let mut rng = StdRng::seed_from_u64(0);
    let CrossFitRecords::Plr(recs) = cross_fit(&data, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected PLR records");
    };
    for r in &recs {
        let train = partition.train_indices(partition.fold_of(r.index));
        assert!(!train.contains(&r.index));
        let y_mean = train.iter().map(|&j| data.y()[j]).sum::<f64>() / train.len() as f64;
        let d_mean = train.iter().map(|&j| data.d()[j]).sum::<f64>() / train.len() as f64;
        assert_eq!(r.l_hat, y_mean);
        assert_eq!(r.m_hat, d_mean);
        assert_eq!(r.y_resid, data.y()[r.index] - y_mean);
        assert_eq!(r.d_resid, data.d()[r.index] - d_mean);
    }
}

#[test]
fn test_clipping_law() {
    let partition = fixed_partition(90);
    let mut rng = StdRng::seed_from_u64(1);
    let in_bounds = |p: f64| (0.01..=0.99).contains(&p);

    let irm = sim(ModelKind::Irm, 90, 1);
    let model = Model::Irm(Irm::new(ols(), Box::new(OutOfRange)));
    let CrossFitRecords::Irm(recs) = cross_fit(&irm, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected IRM records");
    };
    assert!(recs.iter().all(|r| in_bounds(r.propensity)));
    assert!(recs.iter().any(|r| r.propensity == 0.01) && recs.iter().any(|r| r.propensity == 0.99));

    let pliv = sim(ModelKind::Pliv, 90, 2);
    let model = Model::Pliv(Pliv::new(ols(), ols(), Box::new(OutOfRange)));
    let CrossFitRecords::Pliv(recs) = cross_fit(&pliv, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected PLIV records");
    };
    assert!(recs.iter().all(|r| in_bounds(r.r_hat)));

    let iivm = sim(ModelKind::Iivm, 90, 3);
    let model = Model::Iivm(Iivm::new(ols(), Box::new(OutOfRange), Box::new(OutOfRange)));
    let CrossFitRecords::Iivm(recs) = cross_fit(&iivm, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected IIVM records");
    };
    assert!(recs.iter().all(|r| in_bounds(r.z_hat) && in_bounds(r.d_hat)));

    // PLR clips m_hat only for probability learners.
    let model = Model::Plr(Plr::new(ols(), Box::new(OutOfRange)));
    let CrossFitRecords::Plr(recs) = cross_fit(&irm, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected PLR records");
    };
    assert!(recs.iter().all(|r| in_bounds(r.m_hat)));
}

#[test]
fn test_zero_treatment_residual_is_degenerate() {
    let n = 12;
    let x: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
    let y: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
    let data = DmlData::from_rows(x, y, vec![1.0; n], None).unwrap();
    let dml = DoubleMl::new(
        Model::Plr(Plr::new(mean(), mean())),
        DmlConfig { seed: Some(0), ..Default::default() },
    )
    .unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let err = dml.fit_partition(&data, &fixed_partition(n), &mut rng).unwrap_err();
    assert!(matches!(err, Error::NumericDegeneracy(_)), "{err}");
}

#[test]
fn test_irm_perfect_outcome_model() {
    let n = 60;
    let x: Vec<Vec<f64>> = (0..n).map(|i| vec![(i % 11) as f64, (i % 4) as f64]).collect();
    let d: Vec<f64> = (0..n).map(|i| ((i / 2) % 2) as f64).collect();
    let y: Vec<f64> = x.iter().zip(&d).map(|(r, d)| 1.0 + 2.0 * r[0] - r[1] + 3.0 * d).collect();
    let data = DmlData::from_rows(x, y, d, None).unwrap();

    // Deliberately wrong propensity: the training share of D = 1.
    let model = Model::Irm(Irm::new(ols(), Box::new(ConstantMean::classifier())));
    let mut rng = StdRng::seed_from_u64(4);
    let recs = cross_fit(&data, &model, &fixed_partition(n), &mut rng, false).unwrap();
    let CrossFitRecords::Irm(rows) = &recs else {
        panic!("expected IRM records");
    };
    for r in rows {
        assert_abs_diff_eq!(r.y_resid, 0.0, epsilon = 1e-9);
    }
    let mean_effect = rows.iter().map(|r| r.mu1 - r.mu0).sum::<f64>() / n as f64;
    let est = recs.estimate(Default::default(), 0.95).unwrap();
    assert_abs_diff_eq!(est.coef, mean_effect, epsilon = 1e-9);
    assert_abs_diff_eq!(est.coef, 3.0, epsilon = 1e-9);
}

#[test]
fn test_plr_exact_linear_fit() {
    let x: Vec<Vec<f64>> = (1..=9).map(|i| vec![i as f64]).collect();
    let d: Vec<f64> = (0..9).map(|i| (i % 2) as f64).collect();
    let y: Vec<f64> = x.iter().zip(&d).map(|(r, d)| 2.0 * d + r[0]).collect();
    let data = DmlData::from_rows(x, y, d, None).unwrap();
    let cfg = DmlConfig { seed: Some(2024), ..Default::default() };
    let res = DoubleMl::new(Model::Plr(Plr::new(ols(), ols())), cfg).unwrap().fit(&data).unwrap();
    assert_abs_diff_eq!(res.estimate.coef, 2.0, epsilon = 1e-6);
}

#[test]
fn test_iivm_without_always_takers() {
    let data = sim(ModelKind::Iivm, 150, 12);
    let options = IivmOptions { always_takers: false, ..Default::default() };
    let model = Model::from_learner_kind(ModelKind::Iivm, LearnerKind::Ols, &data, options);
    let mut rng = StdRng::seed_from_u64(5);
    let partition = FoldPartition::random(150, 3, &mut rng).unwrap();
    let CrossFitRecords::Iivm(recs) = cross_fit(&data, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected IIVM records");
    };
    assert!(recs.iter().all(|r| r.delta0 == 0.0));
    assert!(recs.iter().any(|r| r.delta1 != 1.0));

    // Neither group: the treatment surface is fixed and ml_r is never fitted.
    let options = IivmOptions { always_takers: false, never_takers: false, ..Default::default() };
    let iivm = Iivm::new(ols(), Box::new(ConstantMean::classifier()), Box::new(OutOfRange));
    let model = Model::Iivm(iivm.with_options(options));
    let CrossFitRecords::Iivm(recs) = cross_fit(&data, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected IIVM records");
    };
    assert!(recs.iter().all(|r| r.delta0 == 0.0 && r.delta1 == 1.0));
}

#[test]
fn test_iivm_score_by_hand() {
    // ν(x, z) = 1 + x1 + 2z, δ(x, z) = 0.2 + 0.5z, ẑ(x) = 0.6 for x1 > 0 else 0.4.
    let ml_g = Formula { output: OutputKind::Continuous, f: |r| 1.0 + r[0] + 2.0 * r[r.len() - 1] };
    let ml_r = Formula { output: OutputKind::Continuous, f: |r| 0.2 + 0.5 * r[r.len() - 1] };
    let ml_m =
        Formula { output: OutputKind::Probability, f: |r| if r[0] > 0.0 { 0.6 } else { 0.4 } };
    let model = Model::Iivm(Iivm::new(Box::new(ml_g), Box::new(ml_m), Box::new(ml_r)));

    let n = 60;
    let data = sim(ModelKind::Iivm, n, 31);
    let mut rng = StdRng::seed_from_u64(0);
    let recs = cross_fit(&data, &model, &fixed_partition(n), &mut rng, false).unwrap();
    let CrossFitRecords::Iivm(rows) = &recs else {
        panic!("expected IIVM records");
    };

    let (y, d, z) = (data.y(), data.d(), data.z().unwrap());
    let mut total = 0.0;
    for rec in rows {
        let i = rec.index;
        let x1 = data.x().get(i, 0);
        let (nu0, nu1, delta0, delta1) = (1.0 + x1, 3.0 + x1, 0.2, 0.7);
        let p = if x1 > 0.0 { 0.6 } else { 0.4 };
        let y_part =
            (nu1 - nu0) + z[i] * (y[i] - nu1) / p - (1.0 - z[i]) * (y[i] - nu0) / (1.0 - p);
        let d_part = (delta1 - delta0) + z[i] * (d[i] - delta1) / p
            - (1.0 - z[i]) * (d[i] - delta0) / (1.0 - p);

        assert_abs_diff_eq!(rec.nu0, nu0, epsilon = 1e-12);
        assert_abs_diff_eq!(rec.nu1, nu1, epsilon = 1e-12);
        assert_abs_diff_eq!(rec.delta0, delta0, epsilon = 1e-12);
        assert_abs_diff_eq!(rec.delta1, delta1, epsilon = 1e-12);
        assert_eq!(rec.z_hat, p);
        assert_abs_diff_eq!(rec.score, y_part - d_part, epsilon = 1e-9);
        total += y_part - d_part;
    }
    let est = recs.estimate(Default::default(), 0.95).unwrap();
    assert_abs_diff_eq!(est.coef, total / n as f64, epsilon = 1e-9);
    assert_eq!(est.n_obs, n);
}

#[test]
fn test_iivm_blended_treatment_clip_flag() {
    let data = sim(ModelKind::Iivm, 90, 21);
    let partition = fixed_partition(90);
    let options = IivmOptions {
        always_takers: false,
        never_takers: false,
        clip_blended_treatment: false,
    };
    let iivm = Iivm::new(ols(), Box::new(ConstantMean::classifier()), ols());
    let model = Model::Iivm(iivm.with_options(options));
    let mut rng = StdRng::seed_from_u64(0);
    let CrossFitRecords::Iivm(recs) = cross_fit(&data, &model, &partition, &mut rng, false).unwrap()
    else {
        panic!("expected IIVM records");
    };
    let z = data.z().unwrap();
    for r in &recs {
        assert_eq!(r.d_hat, z[r.index]);
    }
}

#[test]
fn test_same_seed_same_result_and_parallel_matches() {
    let data = sim(ModelKind::Irm, 120, 77);
    let build = || {
        Model::Irm(Irm::new(
            Box::new(RandomForest::regressor().with_n_trees(15)),
            Box::new(RandomForest::classifier().with_n_trees(15)),
        ))
    };
    let cfg = DmlConfig { seed: Some(99), n_rep: 2, ..Default::default() };
    let a = DoubleMl::new(build(), cfg).unwrap().fit(&data).unwrap();
    let b = DoubleMl::new(build(), cfg).unwrap().fit(&data).unwrap();
    let parallel = DmlConfig { parallel_folds: true, ..cfg };
    let c = DoubleMl::new(build(), parallel).unwrap().fit(&data).unwrap();
    assert_eq!(a.estimate, b.estimate);
    assert_eq!(a.repetitions, b.repetitions);
    assert_eq!(a.estimate, c.estimate);
    assert_eq!(a.repetitions, c.repetitions);

    let mut r1 = StdRng::seed_from_u64(3);
    let mut r2 = StdRng::seed_from_u64(3);
    assert_eq!(
        FoldPartition::random(120, 3, &mut r1).unwrap().sizes(),
        FoldPartition::random(120, 3, &mut r2).unwrap().sizes()
    );
}

#[test]
fn test_missing_instrument_and_non_binary_inputs() {
    let plr_data = sim(ModelKind::Plr, 30, 1);
    let partition = fixed_partition(30);
    let mut rng = StdRng::seed_from_u64(0);

    let pliv = Model::Pliv(Pliv::new(ols(), ols(), ols()));
    assert!(matches!(
        cross_fit(&plr_data, &pliv, &partition, &mut rng, false),
        Err(Error::InputShape(_))
    ));
    // PLR data has a continuous treatment.
    let irm = Model::Irm(Irm::new(ols(), ols()));
    assert!(matches!(
        cross_fit(&plr_data, &irm, &partition, &mut rng, false),
        Err(Error::InputShape(_))
    ));
}

#[test]
fn test_constant_training_target_for_classifier() {
    // Every treated unit sits in fold 0, so the other folds train on D ≡ 0.
    let n = 9;
    let x: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();
    let d: Vec<f64> = (0..n).map(|i| if i < 3 { 1.0 } else { 0.0 }).collect();
    let data = DmlData::from_rows(x, vec![0.5; n], d, None).unwrap();
    let partition =
        FoldPartition::from_assignment(vec![0, 0, 0, 1, 1, 1, 2, 2, 2], 3).unwrap();
    let model = Model::Irm(Irm::new(ols(), Box::new(ConstantMean::classifier())));
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        cross_fit(&data, &model, &partition, &mut rng, true),
        Err(Error::DegenerateFold(_))
    ));
}
