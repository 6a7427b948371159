//! Final-stage regressions and inference summaries.
//!
//! The orthogonal scores of every model reduce to one of three final
//! stages: a slope through residuals (PLR), a mean of scores (IRM, IIVM)
//! or a just-identified IV on residuals (PLIV). All of them go through
//! [`ols_robust`], which returns heteroskedasticity-robust standard errors.

use dml_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Heteroskedasticity-robust covariance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobustVariance {
    /// White (no small-sample correction).
    Hc0,
    /// HC0 scaled by `n / (n − k)`.
    #[default]
    Hc1,
    /// Leverage-adjusted: `e² / (1 − h)`.
    Hc2,
    /// Jackknife-like: `e² / (1 − h)²`.
    Hc3,
}

/// OLS fit with robust standard errors.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients in design-column order.
    pub coefficients: Vec<f64>,
    /// Robust standard errors.
    pub se: Vec<f64>,
    /// Residuals `y − Xβ`.
    pub residuals: Vec<f64>,
}

/// OLS of `y` on `design` (n × k) with a sandwich covariance.
///
/// A singular `X'X` (e.g. an all-zero regressor) is a
/// [`Error::NumericDegeneracy`], never a silent zero.
pub fn ols_robust(y: &[f64], design: &DMatrix<f64>, variance: RobustVariance) -> Result<OlsFit> {
    let n = design.nrows();
    let k = design.ncols();
    if y.len() != n {
        return Err(Error::InputShape(format!("y length ({}) != design rows ({n})", y.len())));
    }
    if n <= k {
        return Err(Error::NumericDegeneracy(format!("{n} observations for {k} coefficients")));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(Error::NumericDegeneracy("non-finite value in regression target".into()));
    }

    let y_vec = DVector::from_column_slice(y);
    let xtx = design.transpose() * design;
    let xtx_inv = xtx
        .try_inverse()
        .filter(|m| m.iter().all(|v| v.is_finite()))
        .ok_or_else(|| Error::NumericDegeneracy("X'X singular in final-stage regression".into()))?;
    let beta = &xtx_inv * (design.transpose() * &y_vec);
    let resid = &y_vec - design * &beta;

    // Meat: Σ w_i e_i² x_i x_i'
    let mut meat = DMatrix::<f64>::zeros(k, k);
    for i in 0..n {
        let xi = design.row(i).transpose();
        let e2 = resid[i] * resid[i];
        let w = match variance {
            RobustVariance::Hc0 => e2,
            RobustVariance::Hc1 => e2 * n as f64 / (n - k) as f64,
            RobustVariance::Hc2 | RobustVariance::Hc3 => {
                let h = (xi.transpose() * &xtx_inv * &xi)[(0, 0)];
                let one_minus_h = 1.0 - h;
                if one_minus_h <= 1e-12 {
                    return Err(Error::NumericDegeneracy(format!(
                        "leverage of observation {i} is {h}"
                    )));
                }
                if variance == RobustVariance::Hc2 {
                    e2 / one_minus_h
                } else {
                    e2 / (one_minus_h * one_minus_h)
                }
            }
        };
        meat += &xi * xi.transpose() * w;
    }
    let vcov = &xtx_inv * meat * &xtx_inv;

    let coefficients: Vec<f64> = beta.iter().copied().collect();
    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(Error::NumericDegeneracy("non-finite final-stage coefficient".into()));
    }
    let se = (0..k).map(|j| vcov[(j, j)].max(0.0).sqrt()).collect();
    Ok(OlsFit { coefficients, se, residuals: resid.iter().copied().collect() })
}

fn with_intercept(x: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] })
}

/// Slope of `y` on `[1, x]`.
pub fn slope_estimate(
    y: &[f64],
    x: &[f64],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    if x.len() != y.len() {
        return Err(Error::InputShape(format!("x length ({}) != y length ({})", x.len(), y.len())));
    }
    let fit = ols_robust(y, &with_intercept(x), variance)?;
    Estimate::new(fit.coefficients[1], fit.se[1], y.len(), conf_level)
}

/// Mean of an orthogonal score: intercept-only regression.
pub fn mean_estimate(score: &[f64], variance: RobustVariance, conf_level: f64) -> Result<Estimate> {
    let fit = ols_robust(score, &DMatrix::from_element(score.len(), 1, 1.0), variance)?;
    Estimate::new(fit.coefficients[0], fit.se[0], score.len(), conf_level)
}

/// Just-identified IV on residuals: the first stage projects `d_resid` on
/// `[1, z_resid]`, the second regresses `y_resid` on `[1, d̂]`.
pub fn residual_iv_estimate(
    y_resid: &[f64],
    d_resid: &[f64],
    z_resid: &[f64],
    variance: RobustVariance,
    conf_level: f64,
) -> Result<Estimate> {
    let n = y_resid.len();
    if d_resid.len() != n || z_resid.len() != n {
        return Err(Error::InputShape("residual vectors differ in length".into()));
    }
    let first = ols_robust(d_resid, &with_intercept(z_resid), RobustVariance::Hc0)
        .map_err(|e| match e {
            Error::NumericDegeneracy(m) => Error::NumericDegeneracy(format!("first stage: {m}")),
            other => other,
        })?;
    let d_hat: Vec<f64> =
        z_resid.iter().map(|z| first.coefficients[0] + first.coefficients[1] * z).collect();
    slope_estimate(y_resid, &d_hat, variance, conf_level)
}

pub(crate) fn standard_normal() -> Normal {
    Normal::new(0.0, 1.0).expect("standard normal parameters are valid")
}

/// Point estimate with normal-approximation inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Point estimate.
    pub coef: f64,
    /// Standard error.
    pub se: f64,
    /// `coef / se`.
    pub t_stat: f64,
    /// Two-sided normal p-value.
    pub p_value: f64,
    /// Lower confidence bound.
    pub ci_lower: f64,
    /// Upper confidence bound.
    pub ci_upper: f64,
    /// Observations used.
    pub n_obs: usize,
}

impl Estimate {
    /// Derive t, p and a two-sided `conf_level` interval from `coef` and `se`.
    pub fn new(coef: f64, se: f64, n_obs: usize, conf_level: f64) -> Result<Self> {
        if !(coef.is_finite() && se.is_finite()) {
            return Err(Error::NumericDegeneracy(format!("coef={coef}, se={se}")));
        }
        validate_conf_level(conf_level)?;
        let normal = standard_normal();
        let t_stat = coef / se;
        let p_value = 2.0 * (1.0 - normal.cdf(t_stat.abs()));
        let z = normal.inverse_cdf(0.5 + conf_level / 2.0);
        Ok(Self {
            coef,
            se,
            t_stat,
            p_value,
            ci_lower: coef - z * se,
            ci_upper: coef + z * se,
            n_obs,
        })
    }
}

pub(crate) fn validate_conf_level(level: f64) -> Result<()> {
    if level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(Error::Validation(format!("conf_level must be in (0, 1), got {level}")))
    }
}

/// Median of a non-empty slice (mean of the two middle values for even
/// lengths).
pub(crate) fn median(values: &[f64]) -> f64 {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let m = v.len() / 2;
    if v.len() % 2 == 0 { 0.5 * (v[m - 1] + v[m]) } else { v[m] }
}

/// Combine repeated cross-fitting runs: median coefficient, and
/// `se = sqrt(median(se_r² + (θ_r − θ̂)²))`.
pub fn aggregate_repetitions(reps: &[Estimate], conf_level: f64) -> Result<Estimate> {
    let Some(first) = reps.first() else {
        return Err(Error::Validation("no repetitions to aggregate".into()));
    };
    if reps.len() == 1 {
        return Ok(*first);
    }
    let coef = median(&reps.iter().map(|r| r.coef).collect::<Vec<_>>());
    let var =
        median(&reps.iter().map(|r| r.se * r.se + (r.coef - coef).powi(2)).collect::<Vec<_>>());
    Estimate::new(coef, var.sqrt(), first.n_obs, conf_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_slope_exact_fit() {
        let x = [1.0, -2.0, 0.5, 3.0, -1.0];
        let y: Vec<f64> = x.iter().map(|v| 1.0 + 2.0 * v).collect();
        let est = slope_estimate(&y, &x, RobustVariance::Hc1, 0.95).unwrap();
        assert_relative_eq!(est.coef, 2.0, epsilon = 1e-10);
        assert!(est.se < 1e-8);
    }

    #[test]
    fn test_zero_regressor_is_degenerate() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let x = [0.0; 4];
        assert!(matches!(
            slope_estimate(&y, &x, RobustVariance::Hc1, 0.95),
            Err(Error::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn test_mean_estimate_hc_variants() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        // Σ(s − 3)² = 10
        let hc0 = mean_estimate(&s, RobustVariance::Hc0, 0.95).unwrap();
        assert_relative_eq!(hc0.coef, 3.0, epsilon = 1e-12);
        assert_relative_eq!(hc0.se, (10.0_f64 / 25.0).sqrt(), epsilon = 1e-12);
        let hc1 = mean_estimate(&s, RobustVariance::Hc1, 0.95).unwrap();
        assert_relative_eq!(hc1.se, (10.0_f64 / 20.0).sqrt(), epsilon = 1e-12);
        // h = 1/n for an intercept-only design
        let hc2 = mean_estimate(&s, RobustVariance::Hc2, 0.95).unwrap();
        assert_relative_eq!(hc2.se, hc1.se, epsilon = 1e-12);
        let hc3 = mean_estimate(&s, RobustVariance::Hc3, 0.95).unwrap();
        assert!(hc3.se > hc2.se);
    }

    #[test]
    fn test_estimate_inference_fields() {
        let est = Estimate::new(1.96, 1.0, 100, 0.95).unwrap();
        assert_relative_eq!(est.p_value, 0.05, epsilon = 1e-3);
        assert_relative_eq!(est.ci_lower, 1.96 - 1.959964, epsilon = 1e-5);
        assert!(Estimate::new(f64::NAN, 1.0, 10, 0.95).is_err());
        assert!(Estimate::new(1.0, 1.0, 10, 1.0).is_err());
    }

    #[test]
    fn test_residual_iv_recovers_slope() {
        let z: Vec<f64> = (0..20).map(|i| (i as f64 - 9.5) / 3.0).collect();
        let d: Vec<f64> =
            z.iter().enumerate().map(|(i, v)| 0.7 * v + 0.1 * (i % 3) as f64).collect();
        let y: Vec<f64> = d.iter().map(|v| -1.5 * v).collect();
        let est = residual_iv_estimate(&y, &d, &z, RobustVariance::Hc1, 0.95).unwrap();
        assert_relative_eq!(est.coef, -1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_aggregate_repetitions_median() {
        let reps = [
            Estimate::new(1.0, 0.1, 50, 0.95).unwrap(),
            Estimate::new(1.2, 0.1, 50, 0.95).unwrap(),
            Estimate::new(5.0, 0.1, 50, 0.95).unwrap(),
        ];
        let agg = aggregate_repetitions(&reps, 0.95).unwrap();
        assert_relative_eq!(agg.coef, 1.2, epsilon = 1e-12);
        // median of {0.01 + 0.04, 0.01, 0.01 + 14.44}
        assert_relative_eq!(agg.se, 0.05_f64.sqrt(), epsilon = 1e-12);
        assert!(aggregate_repetitions(&[], 0.95).is_err());
    }

    #[test]
    fn test_median_even() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
