//! Ordinary least squares learner and the shared linear predictor.

use dml_core::{Error, Learner, Matrix, OutputKind, Predictor, Result};
use nalgebra::{DMatrix, DVector};
use rand::RngCore;

/// Fitted linear predictor `intercept + x · coefficients`.
///
/// With `link = Logit` the linear index is mapped through the logistic
/// function, which is how the penalized logistic learner reuses it.
#[derive(Debug, Clone)]
pub struct LinearModel {
    /// Intercept (0.0 when fitted without one).
    pub intercept: f64,
    /// One coefficient per covariate column.
    pub coefficients: Vec<f64>,
    pub(crate) link: Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    Identity,
    Logit,
}

impl LinearModel {
    pub(crate) fn identity(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self { intercept, coefficients, link: Link::Identity }
    }

    pub(crate) fn logit(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self { intercept, coefficients, link: Link::Logit }
    }

    /// Indices of non-zero coefficients.
    pub fn support(&self) -> Vec<usize> {
        self.coefficients.iter().enumerate().filter(|(_, b)| **b != 0.0).map(|(j, _)| j).collect()
    }

    #[inline]
    fn eta(&self, row: &[f64]) -> f64 {
        self.intercept + row.iter().zip(&self.coefficients).map(|(&x, &b)| x * b).sum::<f64>()
    }
}

impl Predictor for LinearModel {
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if x.ncols() != self.coefficients.len() {
            return Err(Error::InputShape(format!(
                "model has {} coefficients, X has {} columns",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        let out = (0..x.nrows())
            .map(|i| {
                let eta = self.eta(x.row(i));
                match self.link {
                    Link::Identity => eta,
                    Link::Logit => sigmoid(eta),
                }
            })
            .collect();
        Ok(out)
    }
}

#[inline]
pub(crate) fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// Minimum-norm least squares via SVD. Returns `(intercept, coefficients)`.
pub fn least_squares(x: &Matrix, y: &[f64], fit_intercept: bool) -> Result<(f64, Vec<f64>)> {
    let n = x.nrows();
    let p = x.ncols();
    if y.len() != n {
        return Err(Error::InputShape(format!("y length ({}) != n ({})", y.len(), n)));
    }
    let k = p + usize::from(fit_intercept);
    let design = DMatrix::from_fn(n, k, |i, j| {
        if fit_intercept {
            if j == 0 { 1.0 } else { x.get(i, j - 1) }
        } else {
            x.get(i, j)
        }
    });
    let y_vec = DVector::from_column_slice(y);

    let svd = design.svd(true, true);
    let s_max = svd.singular_values.max();
    if s_max <= 0.0 || !s_max.is_finite() {
        return Err(Error::nuisance("ols", "design matrix is identically zero"));
    }
    let beta = svd
        .solve(&y_vec, s_max * 1e-10)
        .map_err(|e| Error::nuisance("ols", format!("least squares solve failed: {e}")))?;

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(Error::nuisance("ols", "non-finite coefficients"));
    }
    if fit_intercept {
        Ok((beta[0], beta.iter().skip(1).copied().collect()))
    } else {
        Ok((0.0, beta.iter().copied().collect()))
    }
}

/// Ordinary least squares.
///
/// Declaring `OutputKind::Probability` turns it into a linear probability
/// model; its predictions are not bounded to `[0, 1]` (the estimators clip
/// propensities themselves).
#[derive(Debug, Clone)]
pub struct LinearRegression {
    /// Fit an unpenalized intercept.
    pub fit_intercept: bool,
    output: OutputKind,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self { fit_intercept: true, output: OutputKind::Continuous }
    }
}

impl LinearRegression {
    /// OLS with intercept.
    pub fn new() -> Self {
        Self::default()
    }

    /// OLS used as a linear probability model.
    pub fn linear_probability() -> Self {
        Self { fit_intercept: true, output: OutputKind::Probability }
    }
}

impl Learner for LinearRegression {
    fn name(&self) -> &str {
        "ols"
    }

    fn output(&self) -> OutputKind {
        self.output
    }

    fn fit(&self, x: &Matrix, y: &[f64], _rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        let (intercept, coefficients) = least_squares(x, y, self.fit_intercept)?;
        Ok(Box::new(LinearModel::identity(intercept, coefficients)))
    }
}
