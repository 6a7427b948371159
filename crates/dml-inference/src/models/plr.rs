//! Partially linear regression: `Y = θD + g(X) + ε`, `D = m(X) + v`.

use dml_core::{Learner, OutputKind, Result};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::aggregate::{Estimate, RobustVariance, slope_estimate};
use crate::crossfit::{FoldView, Indexed, MomentStrategy, fit_predict_one};

/// PLR nuisance learners.
pub struct Plr {
    /// Outcome regression `ℓ(X) = E[Y|X]`.
    pub ml_l: Box<dyn Learner>,
    /// Treatment regression `m(X) = E[D|X]`; clipped when it is a classifier.
    pub ml_m: Box<dyn Learner>,
}

impl Plr {
    /// Bundle the two nuisance learners.
    pub fn new(ml_l: Box<dyn Learner>, ml_m: Box<dyn Learner>) -> Self {
        Self { ml_l, ml_m }
    }
}

/// Held-out PLR quantities for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlrRecord {
    /// Unit index.
    pub index: usize,
    /// `ℓ̂(X)`.
    pub l_hat: f64,
    /// `m̂(X)`.
    pub m_hat: f64,
    /// `Y − ℓ̂(X)`.
    pub y_resid: f64,
    /// `D − m̂(X)`.
    pub d_resid: f64,
}

impl Indexed for PlrRecord {
    fn index(&self) -> usize {
        self.index
    }
}

impl MomentStrategy for Plr {
    type Record = PlrRecord;

    fn name(&self) -> &'static str {
        "plr"
    }

    fn fold_records(&self, fold: &FoldView<'_>, rng: &mut StdRng) -> Result<Vec<PlrRecord>> {
        let data = fold.data;
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
        let mut m_hat = fit_predict_one(
            self.ml_m.as_ref(),
            "ml_m",
            &x_train,
            &fold.train_values(data.d()),
            &x_test,
            rng,
        )?;
        if self.ml_m.output() == OutputKind::Probability {
            fold.clip_propensities("ml_m", &mut m_hat);
        }

        Ok(fold
            .test
            .iter()
            .zip(l_hat.into_iter().zip(m_hat))
            .map(|(&index, (l_hat, m_hat))| PlrRecord {
                index,
                l_hat,
                m_hat,
                y_resid: data.y()[index] - l_hat,
                d_resid: data.d()[index] - m_hat,
            })
            .collect())
    }
}

/// θ̂ as the slope of `y_resid` on `[1, d_resid]`.
pub fn estimate(
    records: &[PlrRecord],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    let y: Vec<f64> = records.iter().map(|r| r.y_resid).collect();
    let d: Vec<f64> = records.iter().map(|r| r.d_resid).collect();
    slope_estimate(&y, &d, variance, conf_level)
}
