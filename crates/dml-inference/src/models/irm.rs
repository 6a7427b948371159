//! Interactive regression model (binary treatment, ATE via the AIPW score).

use dml_core::{DmlData, Learner, Result};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::aggregate::{Estimate, RobustVariance, mean_estimate};
use crate::crossfit::{
    FoldView, Indexed, MomentStrategy, fit_predict, fit_predict_one, pair_at, require_binary,
};

/// IRM nuisance learners.
pub struct Irm {
    /// Outcome regression `g(X, D)`, fitted on `[X | D]`.
    pub ml_g: Box<dyn Learner>,
    /// Propensity `P(D = 1 | X)`.
    pub ml_m: Box<dyn Learner>,
}

impl Irm {
    /// Bundle the two nuisance learners.
    pub fn new(ml_g: Box<dyn Learner>, ml_m: Box<dyn Learner>) -> Self {
        Self { ml_g, ml_m }
    }
}

/// Held-out IRM quantities for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IrmRecord {
    /// Unit index.
    pub index: usize,
    /// `ĝ(X, 0)`.
    pub mu0: f64,
    /// `ĝ(X, 1)`.
    pub mu1: f64,
    /// Clipped propensity.
    pub propensity: f64,
    /// `D·μ₁ + (1 − D)·μ₀`.
    pub y_hat: f64,
    /// `Y − y_hat`.
    pub y_resid: f64,
    /// `D/p − (1 − D)/(1 − p)`.
    pub weight: f64,
    /// `(μ₁ − μ₀) + weight·y_resid`.
    pub score: f64,
}

impl Indexed for IrmRecord {
    fn index(&self) -> usize {
        self.index
    }
}

impl MomentStrategy for Irm {
    type Record = IrmRecord;

    fn name(&self) -> &'static str {
        "irm"
    }

    fn validate(&self, data: &DmlData) -> Result<()> {
        require_binary("IRM", "treatment", data.d())
    }

    fn fold_records(&self, fold: &FoldView<'_>, rng: &mut StdRng) -> Result<Vec<IrmRecord>> {
        let data = fold.data;
        let x_train = fold.x_train();
        let x_test = fold.x_test();
        let d_train = fold.train_values(data.d());

        let xd_train = x_train.with_column(&d_train)?;
        let at0 = x_test.with_constant_column(0.0);
        let at1 = x_test.with_constant_column(1.0);
        let [mu0, mu1] = pair_at(fit_predict(
            self.ml_g.as_ref(),
            "ml_g",
            &xd_train,
            &fold.train_values(data.y()),
            &[&at0, &at1],
            rng,
        )?)?;

        let mut p_hat =
            fit_predict_one(self.ml_m.as_ref(), "ml_m", &x_train, &d_train, &x_test, rng)?;
        fold.clip_propensities("ml_m", &mut p_hat);

        Ok(fold
            .test
            .iter()
            .enumerate()
            .map(|(t, &index)| {
                let (y, d) = (data.y()[index], data.d()[index]);
                let (mu0, mu1, p) = (mu0[t], mu1[t], p_hat[t]);
                let y_hat = d * mu1 + (1.0 - d) * mu0;
                let y_resid = y - y_hat;
                let weight = d / p - (1.0 - d) / (1.0 - p);
                IrmRecord {
                    index,
                    mu0,
                    mu1,
                    propensity: p,
                    y_hat,
                    y_resid,
                    weight,
                    score: (mu1 - mu0) + weight * y_resid,
                }
            })
            .collect())
    }
}

/// ATE as the mean of the AIPW score.
pub fn estimate(
    records: &[IrmRecord],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    let score: Vec<f64> = records.iter().map(|r| r.score).collect();
    mean_estimate(&score, variance, conf_level)
}
