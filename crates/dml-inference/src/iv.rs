//! Two-stage least squares and post-LASSO IV.
//!
//! [`iv_2sls`] is the textbook estimator with first-stage diagnostics and
//! heteroskedasticity-robust standard errors. [`post_lasso_iv`] picks the
//! controls first: plug-in LASSO regressions of `Y`, `D` and `Z` on `X`
//! each select columns, and the union of those columns enters the 2SLS as
//! exogenous regressors next to an intercept.
//!
//! # References
//!
//! - Wooldridge, *Econometric Analysis of Cross Section and Panel Data*, Ch. 5.
//! - Belloni, Chernozhukov & Hansen (2014), "Inference on treatment effects
//!   after selection among high-dimensional controls."

use dml_core::{DmlData, Error, Result};
use dml_learners::{Penalty, PostLasso};
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Estimate, RobustVariance, validate_conf_level};

/// First-stage diagnostics for one endogenous regressor.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FirstStage {
    /// F-statistic of the excluded instruments.
    pub f_stat: f64,
    /// First-stage R².
    pub r_squared: f64,
    /// Partial R² of the excluded instruments.
    pub partial_r_squared: f64,
    /// `F > 10` rule of thumb.
    pub strong: bool,
}

/// 2SLS fit.
#[derive(Debug, Clone, Serialize)]
pub struct IvResult {
    /// Coefficients: exogenous columns first, then endogenous.
    pub coefficients: Vec<f64>,
    /// Names in coefficient order.
    pub names: Vec<String>,
    /// Homoskedastic standard errors.
    pub se: Vec<f64>,
    /// Robust standard errors.
    pub se_robust: Vec<f64>,
    /// First stage per endogenous regressor.
    pub first_stage: Vec<FirstStage>,
    /// Observations.
    pub n_obs: usize,
    /// Excluded instruments.
    pub n_instruments: usize,
}

/// Design blocks for [`iv_2sls`], all row-major with `n` rows.
#[derive(Debug, Clone, Copy)]
pub struct IvDesign<'a> {
    /// Outcome.
    pub y: &'a [f64],
    /// Exogenous regressors (include a column of ones for an intercept).
    pub exog: &'a [f64],
    /// Number of exogenous columns.
    pub k_exog: usize,
    /// Endogenous regressors.
    pub endog: &'a [f64],
    /// Number of endogenous columns.
    pub k_endog: usize,
    /// Excluded instruments.
    pub instruments: &'a [f64],
    /// Number of instrument columns (`>= k_endog`).
    pub m: usize,
}

fn hstack(n: usize, blocks: &[(&[f64], usize)]) -> DMatrix<f64> {
    let k: usize = blocks.iter().map(|(_, c)| c).sum();
    let mut out = DMatrix::zeros(n, k);
    let mut offset = 0;
    for &(data, cols) in blocks {
        for i in 0..n {
            for j in 0..cols {
                out[(i, offset + j)] = data[i * cols + j];
            }
        }
        offset += cols;
    }
    out
}

fn rss(y: &DVector<f64>, x: &DMatrix<f64>) -> Option<f64> {
    let inv = (x.transpose() * x).try_inverse()?;
    let resid = y - x * (inv * (x.transpose() * y));
    Some(resid.norm_squared())
}

/// Two-stage least squares.
///
/// `names` label the coefficients (exogenous then endogenous); generated
/// names are used when its length does not match.
pub fn iv_2sls(
    design: &IvDesign<'_>,
    names: &[String],
    variance: RobustVariance,
) -> Result<IvResult> {
    let IvDesign { y, exog, k_exog, endog, k_endog, instruments, m } = *design;
    let n = y.len();
    if n == 0 {
        return Err(Error::InputShape("y must be non-empty".into()));
    }
    for (what, len, cols) in [
        ("exog", exog.len(), k_exog),
        ("endog", endog.len(), k_endog),
        ("instruments", instruments.len(), m),
    ] {
        if len != n * cols {
            return Err(Error::InputShape(format!(
                "{what} length ({len}) != n*{cols} ({})",
                n * cols
            )));
        }
    }
    if k_endog == 0 {
        return Err(Error::Validation("need at least one endogenous regressor".into()));
    }
    if m < k_endog {
        return Err(Error::Validation(format!(
            "under-identified: {m} instruments for {k_endog} endogenous regressors"
        )));
    }
    let k = k_exog + k_endog;
    if n <= k_exog + m {
        return Err(Error::NumericDegeneracy(format!(
            "{n} observations for {} instruments",
            k_exog + m
        )));
    }

    let y_vec = DVector::from_column_slice(y);
    let z_full = hstack(n, &[(exog, k_exog), (instruments, m)]);
    let ztz_inv = (z_full.transpose() * &z_full)
        .try_inverse()
        .ok_or_else(|| Error::NumericDegeneracy("Z'Z singular in 2SLS".into()))?;
    let exog_mat = hstack(n, &[(exog, k_exog)]);
    let endog_mat = hstack(n, &[(endog, k_endog)]);

    // First stage: project each endogenous column on [exog | Z].
    let endog_hat = &z_full * (&ztz_inv * (z_full.transpose() * &endog_mat));
    let mut first_stage = Vec::with_capacity(k_endog);
    for e in 0..k_endog {
        let col = endog_mat.column(e).into_owned();
        let rss_full = (&col - endog_hat.column(e)).norm_squared();
        let mean = col.mean();
        let tss = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        let rss_restricted = if k_exog > 0 { rss(&col, &exog_mat).unwrap_or(tss) } else { tss };
        let f_stat = if rss_full > 0.0 {
            ((rss_restricted - rss_full) / m as f64) / (rss_full / (n - k_exog - m) as f64)
        } else {
            f64::INFINITY
        };
        first_stage.push(FirstStage {
            f_stat,
            r_squared: if tss > 0.0 { 1.0 - rss_full / tss } else { 0.0 },
            partial_r_squared: if rss_restricted > 0.0 {
                (rss_restricted - rss_full) / rss_restricted
            } else {
                0.0
            },
            strong: f_stat > 10.0,
        });
    }

    // Second stage on [exog | endog_hat]; residuals use the original endog.
    let mut x2 = DMatrix::zeros(n, k);
    x2.columns_mut(0, k_exog).copy_from(&exog_mat);
    x2.columns_mut(k_exog, k_endog).copy_from(&endog_hat);
    let x2tx2_inv = (x2.transpose() * &x2)
        .try_inverse()
        .ok_or_else(|| Error::NumericDegeneracy("second-stage X'X singular in 2SLS".into()))?;
    let beta = &x2tx2_inv * (x2.transpose() * &y_vec);
    let mut x_orig = DMatrix::zeros(n, k);
    x_orig.columns_mut(0, k_exog).copy_from(&exog_mat);
    x_orig.columns_mut(k_exog, k_endog).copy_from(&endog_mat);
    let resid = &y_vec - &x_orig * &beta;

    let sigma2 = resid.norm_squared() / (n - k) as f64;
    let se = (0..k).map(|j| (sigma2 * x2tx2_inv[(j, j)]).max(0.0).sqrt()).collect();
    let se_robust = robust_se(&x2, &resid, &x2tx2_inv, variance)?;

    let names = if names.len() == k {
        names.to_vec()
    } else {
        (0..k_exog)
            .map(|j| format!("exog_{j}"))
            .chain((0..k_endog).map(|j| format!("endog_{j}")))
            .collect()
    };

    let coefficients: Vec<f64> = beta.iter().copied().collect();
    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(Error::NumericDegeneracy("non-finite 2SLS coefficient".into()));
    }
    Ok(IvResult { coefficients, names, se, se_robust, first_stage, n_obs: n, n_instruments: m })
}

/// Sandwich `(X'X)⁻¹ (Σ wᵢ eᵢ² xᵢxᵢ') (X'X)⁻¹` on the second-stage design.
fn robust_se(
    x: &DMatrix<f64>,
    resid: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    variance: RobustVariance,
) -> Result<Vec<f64>> {
    let (n, k) = x.shape();
    let mut meat = DMatrix::<f64>::zeros(k, k);
    for i in 0..n {
        let xi = x.row(i).transpose();
        let e2 = resid[i] * resid[i];
        let h = || (xi.transpose() * xtx_inv * &xi)[(0, 0)];
        let w = match variance {
            RobustVariance::Hc0 => e2,
            RobustVariance::Hc1 => e2 * n as f64 / (n - k) as f64,
            RobustVariance::Hc2 => e2 / (1.0 - h()),
            RobustVariance::Hc3 => e2 / (1.0 - h()).powi(2),
        };
        if !w.is_finite() {
            return Err(Error::NumericDegeneracy(format!("observation {i} has leverage 1")));
        }
        meat += &xi * xi.transpose() * w;
    }
    let vcov = xtx_inv * meat * xtx_inv;
    Ok((0..k).map(|j| vcov[(j, j)].max(0.0).sqrt()).collect())
}

/// Configuration of [`post_lasso_iv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostLassoIvConfig {
    /// Penalty of the three selection regressions.
    pub penalty: Penalty,
    /// Robust covariance of the final 2SLS.
    pub variance: RobustVariance,
    /// Seed for cross-validated penalties.
    pub seed: u64,
    /// Confidence level of the interval.
    pub conf_level: f64,
}

impl Default for PostLassoIvConfig {
    fn default() -> Self {
        Self {
            penalty: Penalty::plug_in(),
            variance: RobustVariance::Hc1,
            seed: 0,
            conf_level: 0.95,
        }
    }
}

/// Result of [`post_lasso_iv`].
#[derive(Debug, Clone, Serialize)]
pub struct PostLassoIvResult {
    /// Effect of `D` with robust inference.
    pub effect: Estimate,
    /// Selected control names (union over the three regressions).
    pub selected: Vec<String>,
    /// Controls selected for `Y`.
    pub selected_y: Vec<String>,
    /// Controls selected for `D`.
    pub selected_d: Vec<String>,
    /// Controls selected for `Z`.
    pub selected_z: Vec<String>,
    /// Full 2SLS fit (intercept, controls, treatment).
    pub iv: IvResult,
}

/// Post-LASSO IV: select controls, then 2SLS of `Y` on `D` instrumented by
/// `Z` with the selected controls as exogenous regressors.
pub fn post_lasso_iv(data: &DmlData, config: &PostLassoIvConfig) -> Result<PostLassoIvResult> {
    validate_conf_level(config.conf_level)?;
    let z = data.instrument()?;
    let x = data.x();
    let selector = PostLasso::new(config.penalty.clone());
    let mut rng = StdRng::seed_from_u64(config.seed);

    let sel_y = selector.select(x, data.y(), &mut rng)?;
    let sel_d = selector.select(x, data.d(), &mut rng)?;
    let sel_z = selector.select(x, z, &mut rng)?;
    let mut union: Vec<usize> = sel_y.iter().chain(&sel_d).chain(&sel_z).copied().collect();
    union.sort_unstable();
    union.dedup();
    log::debug!(
        "post-lasso IV: {} controls selected (y={}, d={}, z={})",
        union.len(),
        sel_y.len(),
        sel_d.len(),
        sel_z.len()
    );

    let n = data.n_obs();
    let k_exog = union.len() + 1;
    let mut exog = Vec::with_capacity(n * k_exog);
    for i in 0..n {
        exog.push(1.0);
        exog.extend(union.iter().map(|&j| x.get(i, j)));
    }
    let x_names = data.x_names();
    let name_of = |cols: &[usize]| cols.iter().map(|&j| x_names[j].clone()).collect::<Vec<_>>();
    let mut names = vec!["const".to_string()];
    names.extend(name_of(&union));
    names.push("d".to_string());

    let design = IvDesign {
        y: data.y(),
        exog: &exog,
        k_exog,
        endog: data.d(),
        k_endog: 1,
        instruments: z,
        m: 1,
    };
    let iv = iv_2sls(&design, &names, config.variance)?;
    let effect =
        Estimate::new(iv.coefficients[k_exog], iv.se_robust[k_exog], n, config.conf_level)?;

    Ok(PostLassoIvResult {
        effect,
        selected: name_of(&union),
        selected_y: name_of(&sel_y),
        selected_d: name_of(&sel_d),
        selected_z: name_of(&sel_z),
        iv,
    })
}
