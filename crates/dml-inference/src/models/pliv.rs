//! Partially linear IV: `Y = θD + g(X) + ε` with a binary instrument `Z`.

use dml_core::{DmlData, Learner, Result};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::aggregate::{Estimate, RobustVariance, residual_iv_estimate};
use crate::crossfit::{FoldView, Indexed, MomentStrategy, fit_predict_one, require_binary};

/// PLIV nuisance learners.
pub struct Pliv {
    /// `ℓ(X) = E[Y|X]`.
    pub ml_l: Box<dyn Learner>,
    /// `m(X) = E[D|X]`, never clipped.
    pub ml_m: Box<dyn Learner>,
    /// `r(X) = E[Z|X]`, always clipped.
    pub ml_r: Box<dyn Learner>,
}

impl Pliv {
    /// Bundle the three nuisance learners.
    pub fn new(ml_l: Box<dyn Learner>, ml_m: Box<dyn Learner>, ml_r: Box<dyn Learner>) -> Self {
        Self { ml_l, ml_m, ml_r }
    }
}

/// Held-out PLIV quantities for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlivRecord {
    /// Unit index.
    pub index: usize,
    /// `ℓ̂(X)`.
    pub l_hat: f64,
    /// `m̂(X)`.
    pub m_hat: f64,
    /// Clipped `r̂(X)`.
    pub r_hat: f64,
    /// `Y − ℓ̂`.
    pub y_resid: f64,
    /// `D − m̂`.
    pub d_resid: f64,
    /// `Z − r̂`.
    pub z_resid: f64,
}

impl Indexed for PlivRecord {
    fn index(&self) -> usize {
        self.index
    }
}

impl MomentStrategy for Pliv {
    type Record = PlivRecord;

    fn name(&self) -> &'static str {
        "pliv"
    }

    fn requires_instrument(&self) -> bool {
        true
    }

    fn validate(&self, data: &DmlData) -> Result<()> {
        require_binary("PLIV", "instrument", data.instrument()?)
    }

    fn fold_records(&self, fold: &FoldView<'_>, rng: &mut StdRng) -> Result<Vec<PlivRecord>> {
        let data = fold.data;
        let z = data.instrument()?;
        let x_train = fold.x_train();
        let x_test = fold.x_test();

        let l_hat = fit_predict_one(
            self.ml_l.as_ref(),
            "ml_l",
            &x_train,
            &fold.train_values(data.y()),
            &x_test,
            rng,
        )?;
        let m_hat = fit_predict_one(
            self.ml_m.as_ref(),
            "ml_m",
            &x_train,
            &fold.train_values(data.d()),
            &x_test,
            rng,
        )?;
        let z_train = fold.train_values(z);
        let mut r_hat =
            fit_predict_one(self.ml_r.as_ref(), "ml_r", &x_train, &z_train, &x_test, rng)?;
        fold.clip_propensities("ml_r", &mut r_hat);

        Ok(fold
            .test
            .iter()
            .enumerate()
            .map(|(t, &index)| PlivRecord {
                index,
                l_hat: l_hat[t],
                m_hat: m_hat[t],
                r_hat: r_hat[t],
                y_resid: data.y()[index] - l_hat[t],
                d_resid: data.d()[index] - m_hat[t],
                z_resid: z[index] - r_hat[t],
            })
            .collect())
    }
}

/// LATE by 2SLS on the residuals.
pub fn estimate(
    records: &[PlivRecord],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    let y: Vec<f64> = records.iter().map(|r| r.y_resid).collect();
    let d: Vec<f64> = records.iter().map(|r| r.d_resid).collect();
    let z: Vec<f64> = records.iter().map(|r| r.z_resid).collect();
    residual_iv_estimate(&y, &d, &z, variance, conf_level)
}
