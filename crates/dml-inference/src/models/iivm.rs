//! Interactive IV model: binary instrument `Z`, binary treatment `D`.
//!
//! The per-unit score is the outcome part of the Wald-type orthogonal score
//! minus its treatment part,
//!
//! ```text
//! y_part = (ν₁ − ν₀) + Z(Y − ν₁)/ẑ − (1 − Z)(Y − ν₀)/(1 − ẑ)
//! d_part = (δ₁ − δ₀) + Z(D − δ₁)/ẑ − (1 − Z)(D − δ₀)/(1 − ẑ)
//! score  = y_part − d_part
//! ```
//!
//! and the estimate is the mean of `score`. That is a difference of the two
//! Wald moments, not their ratio `mean(y_part) / mean(d_part)`, so it does
//! not equal the structural effect of a simulated IIVM sample.

use dml_core::{DmlData, Learner, Result};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Estimate, RobustVariance, mean_estimate};
use crate::crossfit::{
    FoldView, Indexed, MomentStrategy, clip_propensities, fit_predict, fit_predict_one, pair_at,
    require_binary,
};

/// Compliance restrictions for the treatment surface `r(X, Z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IivmOptions {
    /// When `false`, `δ₀ ≡ 0` (nobody takes treatment without the
    /// instrument).
    pub always_takers: bool,
    /// When `false`, `δ₁ ≡ 1` (everybody encouraged takes treatment).
    pub never_takers: bool,
    /// Clip `Z·δ₁ + (1 − Z)·δ₀` to `[clip, 1 − clip]` before forming
    /// `d_resid`.
    pub clip_blended_treatment: bool,
}

impl Default for IivmOptions {
    fn default() -> Self {
        Self { always_takers: true, never_takers: true, clip_blended_treatment: true }
    }
}

/// IIVM nuisance learners.
pub struct Iivm {
    /// `g(X, Z) = E[Y | X, Z]`, fitted on `[X | Z]`.
    pub ml_g: Box<dyn Learner>,
    /// `m(X) = P(Z = 1 | X)`.
    pub ml_m: Box<dyn Learner>,
    /// `r(X, Z) = E[D | X, Z]`, fitted on `[X | Z]`.
    pub ml_r: Box<dyn Learner>,
    /// Compliance restrictions.
    pub options: IivmOptions,
}

impl Iivm {
    /// Bundle the three nuisance learners with default options.
    pub fn new(ml_g: Box<dyn Learner>, ml_m: Box<dyn Learner>, ml_r: Box<dyn Learner>) -> Self {
        Self { ml_g, ml_m, ml_r, options: IivmOptions::default() }
    }

    /// Replace the compliance options.
    pub fn with_options(mut self, options: IivmOptions) -> Self {
        self.options = options;
        self
    }
}

/// Held-out IIVM quantities for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IivmRecord {
    /// Unit index.
    pub index: usize,
    /// `ĝ(X, 0)`.
    pub nu0: f64,
    /// `ĝ(X, 1)`.
    pub nu1: f64,
    /// `r̂(X, 0)`, zero without always-takers.
    pub delta0: f64,
    /// `r̂(X, 1)`, one without never-takers.
    pub delta1: f64,
    /// Clipped instrument propensity.
    pub z_hat: f64,
    /// `Y − (Z·ν₁ + (1 − Z)·ν₀)`.
    pub y_resid: f64,
    /// Blended treatment prediction (clipped unless disabled).
    pub d_hat: f64,
    /// `D − d_hat`.
    pub d_resid: f64,
    /// `y_part − d_part`.
    pub score: f64,
}

impl Indexed for IivmRecord {
    fn index(&self) -> usize {
        self.index
    }
}

impl MomentStrategy for Iivm {
    type Record = IivmRecord;

    fn name(&self) -> &'static str {
        "iivm"
    }

    fn requires_instrument(&self) -> bool {
        true
    }

    fn validate(&self, data: &DmlData) -> Result<()> {
        require_binary("IIVM", "instrument", data.instrument()?)?;
        require_binary("IIVM", "treatment", data.d())
    }

    fn fold_records(&self, fold: &FoldView<'_>, rng: &mut StdRng) -> Result<Vec<IivmRecord>> {
        let data = fold.data;
        let z = data.instrument()?;
        let opts = self.options;
        let x_train = fold.x_train();
        let x_test = fold.x_test();
        let n_test = fold.test.len();

        let xz_train = x_train.with_column(&fold.train_values(z))?;
        let at0 = x_test.with_constant_column(0.0);
        let at1 = x_test.with_constant_column(1.0);

        let [nu0, nu1] = pair_at(fit_predict(
            self.ml_g.as_ref(),
            "ml_g",
            &xz_train,
            &fold.train_values(data.y()),
            &[&at0, &at1],
            rng,
        )?)?;

        let (delta0, delta1) = if opts.always_takers || opts.never_takers {
            let [r0, r1] = pair_at(fit_predict(
                self.ml_r.as_ref(),
                "ml_r",
                &xz_train,
                &fold.train_values(data.d()),
                &[&at0, &at1],
                rng,
            )?)?;
            (
                if opts.always_takers { r0 } else { vec![0.0; n_test] },
                if opts.never_takers { r1 } else { vec![1.0; n_test] },
            )
        } else {
            (vec![0.0; n_test], vec![1.0; n_test])
        };

        let mut z_hat = fit_predict_one(
            self.ml_m.as_ref(),
            "ml_m",
            &x_train,
            &fold.train_values(z),
            &x_test,
            rng,
        )?;
        fold.clip_propensities("ml_m", &mut z_hat);

        let mut d_hat: Vec<f64> = fold
            .test
            .iter()
            .enumerate()
            .map(|(t, &i)| z[i] * delta1[t] + (1.0 - z[i]) * delta0[t])
            .collect();
        if opts.clip_blended_treatment {
            clip_propensities(&mut d_hat, fold.clip);
        }

        Ok(fold
            .test
            .iter()
            .enumerate()
            .map(|(t, &index)| {
                let (y, d, zi) = (data.y()[index], data.d()[index], z[index]);
                let (n0, n1, r0, r1, zh) = (nu0[t], nu1[t], delta0[t], delta1[t], z_hat[t]);
                let y_part = (n1 - n0) + zi * (y - n1) / zh - (1.0 - zi) * (y - n0) / (1.0 - zh);
                let d_part = (r1 - r0) + zi * (d - r1) / zh - (1.0 - zi) * (d - r0) / (1.0 - zh);
                IivmRecord {
                    index,
                    nu0: n0,
                    nu1: n1,
                    delta0: r0,
                    delta1: r1,
                    z_hat: zh,
                    y_resid: y - (zi * n1 + (1.0 - zi) * n0),
                    d_hat: d_hat[t],
                    d_resid: d - d_hat[t],
                    score: y_part - d_part,
                }
            })
            .collect())
    }
}

/// Mean of the IIVM score with a robust standard error.
pub fn estimate(
    records: &[IivmRecord],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    let score: Vec<f64> = records.iter().map(|r| r.score).collect();
    mean_estimate(&score, variance, conf_level)
}
