//! Elastic-net penalized linear and logistic regression.
//!
//! Both learners minimise the glmnet objective on standardized columns with
//! an unpenalized intercept:
//!
//! ```text
//! L(β) + λ · ( α‖β‖₁ + (1−α)/2 · ‖β‖₂² )
//! ```
//!
//! with `L = RSS/(2n)` (Gaussian) or the mean negative log-likelihood
//! (binomial, solved by IRLS with a weighted coordinate-descent inner loop).
//! `α = 1` is the LASSO, `α = 0.5` the default elastic net.
//!
//! The penalty level λ is fixed, chosen by K-fold cross-validation over a
//! log-spaced path (λ_min rule), or set by the Belloni–Chernozhukov–Hansen
//! plug-in rule `λα = c·σ̂·Φ⁻¹(1 − γ/(2p)) / √n` with an iterated noise
//! estimate σ̂ and `γ = 0.1 / ln n` unless set (Gaussian only).

use dml_core::{Error, FoldPartition, Learner, Matrix, OutputKind, Predictor, Result, is_binary};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::linear::{LinearModel, sigmoid};

const SCALE_EPS: f64 = 1e-12;
const PLUG_IN_ITERS: usize = 15;
const IRLS_MAX_OUTER: usize = 100;
const IRLS_MIN_WEIGHT: f64 = 1e-5;

/// How the penalty level λ is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    /// Fixed λ.
    Fixed(f64),
    /// K-fold cross-validation over `n_lambda` values from λ_max down to
    /// `min_ratio · λ_max`; the λ with the smallest CV loss is used.
    CrossValidated {
        /// Number of path points.
        n_lambda: usize,
        /// Number of CV folds.
        n_folds: usize,
        /// Smallest λ relative to λ_max.
        min_ratio: f64,
    },
    /// Plug-in rule (Gaussian only).
    PlugIn {
        /// Slack constant (typically 1.1).
        c: f64,
        /// Significance level; `None` resolves to `0.1 / ln n` at fit time.
        gamma: Option<f64>,
    },
}

impl Penalty {
    /// 5-fold CV over a 100-point path.
    pub fn cross_validated() -> Self {
        Penalty::CrossValidated { n_lambda: 100, n_folds: 5, min_ratio: 1e-3 }
    }

    /// Plug-in rule with `c = 1.1`, `γ = 0.1 / ln n`.
    pub fn plug_in() -> Self {
        Penalty::PlugIn { c: 1.1, gamma: None }
    }
}

/// Default plug-in significance level for `n` observations.
pub fn plug_in_gamma(n: usize) -> f64 {
    0.1 / (n as f64).ln().max(1.0)
}

impl Default for Penalty {
    fn default() -> Self {
        Self::cross_validated()
    }
}

/// Column-standardized copy of a design matrix (column-major).
#[derive(Debug, Clone)]
struct Standardized {
    n: usize,
    cols: Vec<Vec<f64>>,
    means: Vec<f64>,
    scales: Vec<f64>, // 0.0 marks a constant column
}

impl Standardized {
    fn new(x: &Matrix) -> Self {
        let n = x.nrows();
        let p = x.ncols();
        let nf = n as f64;
        let mut cols = Vec::with_capacity(p);
        let mut means = Vec::with_capacity(p);
        let mut scales = Vec::with_capacity(p);
        for j in 0..p {
            let col = x.column(j);
            let mean = col.iter().sum::<f64>() / nf;
            let sd = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nf).sqrt();
            if sd > SCALE_EPS {
                cols.push(col.iter().map(|v| (v - mean) / sd).collect());
                scales.push(sd);
            } else {
                cols.push(vec![0.0; n]);
                scales.push(0.0);
            }
            means.push(mean);
        }
        Self { n, cols, means, scales }
    }

    fn p(&self) -> usize {
        self.cols.len()
    }

    /// Map standardized coefficients back to the original scale.
    fn to_original(&self, b0_std: f64, beta: &[f64]) -> (f64, Vec<f64>) {
        let mut intercept = b0_std;
        let coefs: Vec<f64> = beta
            .iter()
            .zip(&self.scales)
            .zip(&self.means)
            .map(|((&b, &s), &m)| {
                if s > 0.0 {
                    intercept -= b * m / s;
                    b / s
                } else {
                    0.0
                }
            })
            .collect();
        (intercept, coefs)
    }

    fn lambda_max(&self, centered: &[f64], alpha: f64) -> f64 {
        let nf = self.n as f64;
        let max_grad = self
            .cols
            .iter()
            .map(|c| (c.iter().zip(centered).map(|(a, b)| a * b).sum::<f64>() / nf).abs())
            .fold(0.0_f64, f64::max);
        max_grad / alpha.max(1e-3)
    }
}

#[inline]
fn soft_threshold(z: f64, g: f64) -> f64 {
    if z > g {
        z - g
    } else if z < -g {
        z + g
    } else {
        0.0
    }
}

fn lambda_path(lambda_max: f64, n_lambda: usize, min_ratio: f64) -> Vec<f64> {
    if n_lambda == 1 {
        return vec![lambda_max];
    }
    let lo = (lambda_max * min_ratio).ln();
    let hi = lambda_max.ln();
    (0..n_lambda).map(|k| (hi + (lo - hi) * k as f64 / (n_lambda - 1) as f64).exp()).collect()
}

/// Gaussian coordinate descent. `r` must hold `y_centered − Xs·β` on entry
/// and is kept consistent. Returns `true` on convergence.
fn cd_gaussian(
    xs: &Standardized,
    r: &mut [f64],
    beta: &mut [f64],
    lambda: f64,
    alpha: f64,
    max_iter: usize,
    tol: f64,
) -> bool {
    let nf = xs.n as f64;
    let l1 = lambda * alpha;
    let denom = 1.0 + lambda * (1.0 - alpha);
    for _ in 0..max_iter {
        let mut max_delta = 0.0_f64;
        for j in 0..xs.p() {
            if xs.scales[j] == 0.0 {
                continue;
            }
            let col = &xs.cols[j];
            let old = beta[j];
            let rho = col.iter().zip(r.iter()).map(|(a, b)| a * b).sum::<f64>() / nf + old;
            let new = soft_threshold(rho, l1) / denom;
            let delta = new - old;
            if delta != 0.0 {
                for (ri, ci) in r.iter_mut().zip(col) {
                    *ri -= ci * delta;
                }
                beta[j] = new;
                max_delta = max_delta.max(delta.abs());
            }
        }
        if max_delta < tol {
            return true;
        }
    }
    false
}

/// Binomial IRLS with weighted coordinate descent. `b0` / `beta` are warm
/// starts on the standardized scale. Returns `true` on convergence.
#[allow(clippy::too_many_arguments)]
fn irls_logistic(
    xs: &Standardized,
    y: &[f64],
    b0: &mut f64,
    beta: &mut [f64],
    lambda: f64,
    alpha: f64,
    max_iter: usize,
    tol: f64,
) -> bool {
    let n = xs.n;
    let nf = n as f64;
    let l1 = lambda * alpha;
    let l2 = lambda * (1.0 - alpha);

    let mut eta = vec![0.0; n];
    let mut w = vec![0.0; n];
    let mut r = vec![0.0; n];

    for _ in 0..IRLS_MAX_OUTER {
        let prev_b0 = *b0;
        let prev_beta = beta.to_vec();

        for i in 0..n {
            let e = *b0 + (0..xs.p()).map(|j| xs.cols[j][i] * beta[j]).sum::<f64>();
            let p = sigmoid(e);
            eta[i] = e;
            w[i] = (p * (1.0 - p)).max(IRLS_MIN_WEIGHT);
            r[i] = (y[i] - p) / w[i];
        }
        let sw: f64 = w.iter().sum();

        for _ in 0..max_iter {
            let delta0 = w.iter().zip(&r).map(|(a, b)| a * b).sum::<f64>() / sw;
            *b0 += delta0;
            r.iter_mut().for_each(|ri| *ri -= delta0);
            let mut max_delta = delta0.abs();

            for j in 0..xs.p() {
                if xs.scales[j] == 0.0 {
                    continue;
                }
                let col = &xs.cols[j];
                let mut xwx = 0.0;
                let mut xwr = 0.0;
                for i in 0..n {
                    let wc = w[i] * col[i];
                    xwx += wc * col[i];
                    xwr += wc * r[i];
                }
                xwx /= nf;
                let old = beta[j];
                let g = xwr / nf + xwx * old;
                let new = soft_threshold(g, l1) / (xwx + l2);
                let delta = new - old;
                if delta != 0.0 {
                    for (ri, ci) in r.iter_mut().zip(col) {
                        *ri -= ci * delta;
                    }
                    beta[j] = new;
                    max_delta = max_delta.max(delta.abs());
                }
            }
            if max_delta < tol {
                break;
            }
        }

        let change = beta
            .iter()
            .zip(&prev_beta)
            .map(|(a, b)| (a - b).abs())
            .fold((*b0 - prev_b0).abs(), f64::max);
        if change < tol {
            return true;
        }
    }
    false
}

/// K-fold CV over `path`. `fit_path` fits the whole path on a training
/// split; `loss` scores held-out predictions. Returns the λ with the
/// smallest summed loss (ties go to the larger λ).
fn cross_validate<F, L>(
    x: &Matrix,
    y: &[f64],
    path: &[f64],
    n_folds: usize,
    rng: &mut dyn RngCore,
    fit_path: F,
    loss: L,
) -> Result<f64>
where
    F: Fn(&Matrix, &[f64], &[f64]) -> Result<Vec<LinearModel>>,
    L: Fn(&[f64], &[f64]) -> f64,
{
    let part = FoldPartition::random(x.nrows(), n_folds, rng)?;
    let mut cv_loss = vec![0.0; path.len()];
    for f in 0..n_folds {
        let train = part.train_indices(f);
        let test = part.test_indices(f);
        let x_train = x.select_rows(&train);
        let y_train: Vec<f64> = train.iter().map(|&i| y[i]).collect();
        let x_test = x.select_rows(test);
        let y_test: Vec<f64> = test.iter().map(|&i| y[i]).collect();

        let models = fit_path(&x_train, &y_train, path)?;
        for (k, model) in models.iter().enumerate() {
            let pred = model.predict(&x_test)?;
            cv_loss[k] += loss(&pred, &y_test);
        }
    }
    let best = cv_loss
        .iter()
        .enumerate()
        .fold((0usize, f64::INFINITY), |acc, (k, &l)| if l < acc.1 { (k, l) } else { acc })
        .0;
    log::debug!("cv selected lambda={:.3e} (index {} of {})", path[best], best, path.len());
    Ok(path[best])
}

fn squared_error(pred: &[f64], y: &[f64]) -> f64 {
    pred.iter().zip(y).map(|(p, t)| (p - t).powi(2)).sum()
}

fn binomial_deviance(pred: &[f64], y: &[f64]) -> f64 {
    pred.iter()
        .zip(y)
        .map(|(&p, &t)| {
            let p = p.clamp(1e-12, 1.0 - 1e-12);
            -2.0 * (t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum()
}

fn validate_common(alpha: f64, max_iter: usize, tol: f64) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(Error::Validation(format!("alpha must be in (0, 1], got {alpha}")));
    }
    if max_iter == 0 {
        return Err(Error::Validation("max_iter must be >= 1".into()));
    }
    if !(tol > 0.0 && tol.is_finite()) {
        return Err(Error::Validation(format!("tol must be positive, got {tol}")));
    }
    Ok(())
}

fn validate_penalty(penalty: &Penalty) -> Result<()> {
    match *penalty {
        Penalty::Fixed(l) if !(l >= 0.0 && l.is_finite()) => {
            Err(Error::Validation(format!("lambda must be finite and >= 0, got {l}")))
        }
        Penalty::CrossValidated { n_lambda, n_folds, min_ratio } => {
            if n_lambda == 0 || n_folds < 2 || !(min_ratio > 0.0 && min_ratio < 1.0) {
                Err(Error::Validation(format!(
                    "invalid CV penalty: n_lambda={n_lambda}, n_folds={n_folds}, min_ratio={min_ratio}"
                )))
            } else {
                Ok(())
            }
        }
        Penalty::PlugIn { c, gamma } => {
            let gamma_ok = gamma.is_none_or(|g| g > 0.0 && g < 1.0);
            if c > 0.0 && gamma_ok {
                Ok(())
            } else {
                Err(Error::Validation(format!("invalid plug-in penalty: c={c}, gamma={gamma:?}")))
            }
        }
        _ => Ok(()),
    }
}

fn warn_unconverged(name: &str, unconverged: usize, path_len: usize, max_iter: usize) {
    if unconverged > 0 {
        log::warn!(
            "{name}: {unconverged} of {path_len} path fits did not converge in {max_iter} sweeps"
        );
    }
}

fn check_xy(name: &str, x: &Matrix, y: &[f64]) -> Result<()> {
    if y.len() != x.nrows() {
        return Err(Error::InputShape(format!(
            "{name}: y length ({}) != n ({})",
            y.len(),
            x.nrows()
        )));
    }
    if x.nrows() == 0 {
        return Err(Error::DegenerateFold(format!("{name}: empty training set")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Gaussian elastic net
// ---------------------------------------------------------------------------

/// Elastic-net penalized least squares (`α = 1`: LASSO).
#[derive(Debug, Clone)]
pub struct ElasticNet {
    /// Mixing parameter in `(0, 1]`.
    pub alpha: f64,
    /// Penalty level rule.
    pub penalty: Penalty,
    /// Maximum coordinate-descent sweeps.
    pub max_iter: usize,
    /// Convergence tolerance on standardized coefficients.
    pub tol: f64,
}

impl Default for ElasticNet {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl ElasticNet {
    /// Elastic net with mixing `alpha` and a cross-validated penalty.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, penalty: Penalty::default(), max_iter: 1000, tol: 1e-7 }
    }

    /// LASSO (`α = 1`) with a cross-validated penalty.
    pub fn lasso() -> Self {
        Self::new(1.0)
    }

    /// Set the penalty rule.
    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    /// Set the maximum number of sweeps.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    fn path_models(&self, x: &Matrix, y: &[f64], path: &[f64]) -> Result<Vec<LinearModel>> {
        let xs = Standardized::new(x);
        let y_mean = y.iter().sum::<f64>() / y.len() as f64;
        let mut r: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
        let mut beta = vec![0.0; xs.p()];
        let mut out = Vec::with_capacity(path.len());
        let mut unconverged = 0;
        for &lambda in path {
            if !cd_gaussian(&xs, &mut r, &mut beta, lambda, self.alpha, self.max_iter, self.tol) {
                unconverged += 1;
            }
            let (b0, b) = xs.to_original(y_mean, &beta);
            out.push(LinearModel::identity(b0, b));
        }
        warn_unconverged(self.name(), unconverged, path.len(), self.max_iter);
        Ok(out)
    }

    /// Fit and return the linear model together with the λ used.
    pub fn fit_linear(
        &self,
        x: &Matrix,
        y: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<(LinearModel, f64)> {
        validate_common(self.alpha, self.max_iter, self.tol)?;
        validate_penalty(&self.penalty)?;
        check_xy(self.name(), x, y)?;

        let xs = Standardized::new(x);
        let n = x.nrows();
        let y_mean = y.iter().sum::<f64>() / n as f64;
        let yc: Vec<f64> = y.iter().map(|v| v - y_mean).collect();

        let lambda = match self.penalty {
            Penalty::Fixed(l) => l,
            Penalty::CrossValidated { n_lambda, n_folds, min_ratio } => {
                let lmax = xs.lambda_max(&yc, self.alpha);
                if lmax <= 0.0 {
                    0.0
                } else {
                    let path = lambda_path(lmax, n_lambda, min_ratio);
                    cross_validate(
                        x,
                        y,
                        &path,
                        n_folds,
                        rng,
                        |xt, yt, pth| self.path_models(xt, yt, pth),
                        squared_error,
                    )?
                }
            }
            Penalty::PlugIn { c, gamma } => return self.fit_plug_in(&xs, &yc, y_mean, c, gamma),
        };

        let mut beta = vec![0.0; xs.p()];
        let mut r = yc;
        if !cd_gaussian(&xs, &mut r, &mut beta, lambda, self.alpha, self.max_iter, self.tol) {
            log::warn!(
                "{}: coordinate descent did not converge in {} sweeps (lambda={:.3e})",
                self.name(),
                self.max_iter,
                lambda
            );
        }
        let (b0, b) = xs.to_original(y_mean, &beta);
        Ok((LinearModel::identity(b0, b), lambda))
    }

    fn fit_plug_in(
        &self,
        xs: &Standardized,
        yc: &[f64],
        y_mean: f64,
        c: f64,
        gamma: Option<f64>,
    ) -> Result<(LinearModel, f64)> {
        let n = xs.n;
        let nf = n as f64;
        let p = xs.p().max(1) as f64;
        let gamma = gamma.unwrap_or_else(|| plug_in_gamma(n));
        let q = Normal::new(0.0, 1.0)
            .map_err(|e| Error::Validation(format!("standard normal: {e}")))?
            .inverse_cdf(1.0 - gamma / (2.0 * p));

        let mut sigma = (yc.iter().map(|v| v * v).sum::<f64>() / nf).sqrt();
        let mut beta = vec![0.0; xs.p()];
        let mut r = yc.to_vec();
        let mut lambda = 0.0;
        if sigma <= 0.0 {
            return Ok((LinearModel::identity(y_mean, vec![0.0; xs.p()]), lambda));
        }

        for _ in 0..PLUG_IN_ITERS {
            lambda = c * sigma * q / nf.sqrt() / self.alpha;
            if !cd_gaussian(xs, &mut r, &mut beta, lambda, self.alpha, self.max_iter, self.tol) {
                log::warn!(
                    "{}: plug-in coordinate descent did not converge in {} sweeps (lambda={:.3e})",
                    self.name(),
                    self.max_iter,
                    lambda
                );
            }
            let s = beta.iter().filter(|b| **b != 0.0).count();
            let dof = n.saturating_sub(s + 1).max(1) as f64;
            let next = (r.iter().map(|v| v * v).sum::<f64>() / dof).sqrt();
            let done = (next - sigma).abs() <= 1e-6 * sigma;
            sigma = next;
            if done || sigma <= 0.0 {
                break;
            }
        }
        let (b0, b) = xs.to_original(y_mean, &beta);
        Ok((LinearModel::identity(b0, b), lambda))
    }
}

impl Learner for ElasticNet {
    fn name(&self) -> &str {
        if self.alpha == 1.0 { "lasso" } else { "elastic_net" }
    }

    fn output(&self) -> OutputKind {
        OutputKind::Continuous
    }

    fn fit(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        let (model, _) = self.fit_linear(x, y, rng)?;
        Ok(Box::new(model))
    }
}

// ---------------------------------------------------------------------------
// Binomial elastic net
// ---------------------------------------------------------------------------

/// Elastic-net penalized logistic regression; predicts `P(y = 1 | x)`.
#[derive(Debug, Clone)]
pub struct PenalizedLogistic {
    /// Mixing parameter in `(0, 1]`.
    pub alpha: f64,
    /// Penalty level rule (`Fixed` or `CrossValidated`).
    pub penalty: Penalty,
    /// Maximum inner sweeps per IRLS step.
    pub max_iter: usize,
    /// Convergence tolerance on standardized coefficients.
    pub tol: f64,
}

impl Default for PenalizedLogistic {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl PenalizedLogistic {
    /// Logistic elastic net with mixing `alpha` and a cross-validated penalty.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, penalty: Penalty::default(), max_iter: 1000, tol: 1e-6 }
    }

    /// L1-penalized logistic regression.
    pub fn lasso() -> Self {
        Self::new(1.0)
    }

    /// Set the penalty rule.
    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    fn path_models(&self, x: &Matrix, y: &[f64], path: &[f64]) -> Result<Vec<LinearModel>> {
        let xs = Standardized::new(x);
        let ybar = (y.iter().sum::<f64>() / y.len() as f64).clamp(1e-6, 1.0 - 1e-6);
        let mut b0 = (ybar / (1.0 - ybar)).ln();
        let mut beta = vec![0.0; xs.p()];
        let mut out = Vec::with_capacity(path.len());
        let mut unconverged = 0;
        for &lambda in path {
            let converged = irls_logistic(
                &xs,
                y,
                &mut b0,
                &mut beta,
                lambda,
                self.alpha,
                self.max_iter,
                self.tol,
            );
            if !converged {
                unconverged += 1;
            }
            let (c0, c) = xs.to_original(b0, &beta);
            out.push(LinearModel::logit(c0, c));
        }
        warn_unconverged(self.name(), unconverged, path.len(), self.max_iter);
        Ok(out)
    }

    /// Fit and return the model with the λ used.
    pub fn fit_logistic(
        &self,
        x: &Matrix,
        y: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<(LinearModel, f64)> {
        validate_common(self.alpha, self.max_iter, self.tol)?;
        validate_penalty(&self.penalty)?;
        check_xy(self.name(), x, y)?;
        if !is_binary(y) {
            return Err(Error::nuisance(self.name(), "classification target must be 0/1"));
        }
        let n_pos = y.iter().filter(|v| **v == 1.0).count();
        if n_pos == 0 || n_pos == y.len() {
            return Err(Error::DegenerateFold(format!(
                "{}: training target is constant ({})",
                self.name(),
                if n_pos == 0 { 0 } else { 1 }
            )));
        }

        let lambda = match self.penalty {
            Penalty::Fixed(l) => l,
            Penalty::CrossValidated { n_lambda, n_folds, min_ratio } => {
                let xs = Standardized::new(x);
                let ybar = n_pos as f64 / y.len() as f64;
                let yc: Vec<f64> = y.iter().map(|v| v - ybar).collect();
                let lmax = xs.lambda_max(&yc, self.alpha);
                if lmax <= 0.0 {
                    0.0
                } else {
                    let path = lambda_path(lmax, n_lambda, min_ratio);
                    cross_validate(
                        x,
                        y,
                        &path,
                        n_folds,
                        rng,
                        |xt, yt, pth| self.path_models(xt, yt, pth),
                        binomial_deviance,
                    )?
                }
            }
            Penalty::PlugIn { .. } => {
                return Err(Error::Validation(
                    "plug-in penalty is only available for the Gaussian elastic net".into(),
                ));
            }
        };

        let xs = Standardized::new(x);
        let ybar = n_pos as f64 / y.len() as f64;
        let mut b0 = (ybar / (1.0 - ybar)).ln();
        let mut beta = vec![0.0; xs.p()];
        if !irls_logistic(&xs, y, &mut b0, &mut beta, lambda, self.alpha, self.max_iter, self.tol)
        {
            log::warn!("{}: IRLS did not converge (lambda={:.3e})", self.name(), lambda);
        }
        if !b0.is_finite() || beta.iter().any(|b| !b.is_finite()) {
            return Err(Error::nuisance(self.name(), "non-finite coefficients"));
        }
        let (c0, c) = xs.to_original(b0, &beta);
        Ok((LinearModel::logit(c0, c), lambda))
    }
}

impl Learner for PenalizedLogistic {
    fn name(&self) -> &str {
        if self.alpha == 1.0 { "logistic_lasso" } else { "logistic_elastic_net" }
    }

    fn output(&self) -> OutputKind {
        OutputKind::Probability
    }

    fn fit(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        let (model, _) = self.fit_logistic(x, y, rng)?;
        Ok(Box::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn sparse_problem(n: usize, p: usize, seed: u64) -> (Matrix, Vec<f64>) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut rows = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let row: Vec<f64> = (0..p).map(|_| StandardNormal.sample(&mut rng)).collect();
            let eps: f64 = StandardNormal.sample(&mut rng);
            y.push(1.0 + 3.0 * row[0] - 2.0 * row[1] + 0.1 * eps);
            rows.push(row);
        }
        (Matrix::from_rows(rows).unwrap(), y)
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_lambda_path_endpoints() {
        let path = lambda_path(2.0, 5, 1e-2);
        assert_eq!(path.len(), 5);
        assert_relative_eq!(path[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(path[4], 0.02, epsilon = 1e-12);
        assert!(path.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_zero_penalty_matches_ols() {
        let (x, y) = sparse_problem(80, 4, 1);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (model, _) = ElasticNet::lasso()
            .with_penalty(Penalty::Fixed(0.0))
            .with_tol(1e-12)
            .with_max_iter(100_000)
            .fit_linear(&x, &y, &mut rng)
            .unwrap();
        let (b0, b) = crate::linear::least_squares(&x, &y, true).unwrap();
        assert_relative_eq!(model.intercept, b0, epsilon = 1e-6);
        for (a, e) in model.coefficients.iter().zip(&b) {
            assert_relative_eq!(a, e, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_large_penalty_gives_intercept_only() {
        let (x, y) = sparse_problem(50, 3, 2);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (model, _) = ElasticNet::lasso()
            .with_penalty(Penalty::Fixed(1e6))
            .fit_linear(&x, &y, &mut rng)
            .unwrap();
        assert!(model.coefficients.iter().all(|b| *b == 0.0));
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert_relative_eq!(model.intercept, mean, epsilon = 1e-12);
    }

    #[test]
    fn test_cv_lasso_recovers_support() {
        let (x, y) = sparse_problem(200, 10, 3);
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let (model, lambda) = ElasticNet::lasso().fit_linear(&x, &y, &mut rng).unwrap();
        assert!(lambda > 0.0);
        assert!((model.coefficients[0] - 3.0).abs() < 0.1, "b1={}", model.coefficients[0]);
        assert!((model.coefficients[1] + 2.0).abs() < 0.1, "b2={}", model.coefficients[1]);
    }

    /// Trigonometric covariates and a periodic error: no RNG involved.
    fn trig_problem(n: usize, p: usize) -> (Matrix, Vec<f64>) {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..p).map(|j| ((i * (2 * j + 3) + j * j) as f64 * 0.61).sin()).collect())
            .collect();
        let y = rows
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let e = ((i * 37) % 17) as f64 / 8.0 - 1.0;
                1.0 + 3.0 * r[0] - 2.0 * r[1] + 0.1 * e
            })
            .collect();
        (Matrix::from_rows(rows).unwrap(), y)
    }

    #[test]
    fn test_plug_in_gamma_shrinks_with_n() {
        assert_relative_eq!(plug_in_gamma(300), 0.1 / 300f64.ln(), epsilon = 1e-15);
        assert_eq!(plug_in_gamma(2), 0.1);
        assert!(plug_in_gamma(10_000) < plug_in_gamma(100));
        assert_eq!(Penalty::plug_in(), Penalty::PlugIn { c: 1.1, gamma: None });
    }

    #[test]
    fn test_plug_in_selects_true_support() {
        let (x, y) = trig_problem(300, 20);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (model, lambda) = ElasticNet::lasso()
            .with_penalty(Penalty::plug_in())
            .fit_linear(&x, &y, &mut rng)
            .unwrap();
        assert!(lambda > 0.0);
        assert_eq!(model.support(), vec![0, 1]);
    }

    #[test]
    fn test_default_plug_in_penalizes_more_than_flat_gamma() {
        let (x, y) = trig_problem(300, 20);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let fit = |gamma| {
            let penalty = Penalty::PlugIn { c: 1.1, gamma };
            ElasticNet::lasso().with_penalty(penalty).fit_linear(&x, &y, &mut rng.clone()).unwrap()
        };
        let (_, by_n) = fit(None);
        let (_, flat) = fit(Some(0.1));
        assert!(by_n > flat, "lambda(0.1/ln n)={by_n} lambda(0.1)={flat}");
        let (x, y) = sparse_problem(20, 2, 6);
        let bad = Penalty::PlugIn { c: 1.1, gamma: Some(1.5) };
        assert!(ElasticNet::lasso().with_penalty(bad).fit(&x, &y, &mut rng).is_err());
    }

    #[test]
    fn test_plug_in_unconverged_still_returns_model() {
        let (x, y) = trig_problem(120, 6);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (model, lambda) = ElasticNet::lasso()
            .with_penalty(Penalty::plug_in())
            .with_max_iter(1)
            .with_tol(1e-15)
            .fit_linear(&x, &y, &mut rng)
            .unwrap();
        assert!(lambda > 0.0 && lambda.is_finite());
        assert!(model.coefficients.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_constant_column_is_ignored() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, 5.0]).collect();
        let y: Vec<f64> = (0..30).map(|i| 2.0 * i as f64).collect();
        let x = Matrix::from_rows(rows).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let (model, _) = ElasticNet::new(0.5)
            .with_penalty(Penalty::Fixed(0.0))
            .fit_linear(&x, &y, &mut rng)
            .unwrap();
        assert_eq!(model.coefficients[1], 0.0);
        assert!(model.predict(&x).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_invalid_configuration() {
        let (x, y) = sparse_problem(20, 2, 6);
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        assert!(ElasticNet::new(0.0).fit(&x, &y, &mut rng).is_err());
        assert!(
            ElasticNet::lasso().with_penalty(Penalty::Fixed(-1.0)).fit(&x, &y, &mut rng).is_err()
        );
    }

    #[test]
    fn test_logistic_probabilities() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for _ in 0..400 {
            let a: f64 = StandardNormal.sample(&mut rng);
            let b: f64 = StandardNormal.sample(&mut rng);
            let p = sigmoid(1.5 * a);
            let u: f64 = rand::Rng::random(&mut rng);
            y.push(if u < p { 1.0 } else { 0.0 });
            rows.push(vec![a, b]);
        }
        let x = Matrix::from_rows(rows).unwrap();
        let mut fit_rng = rand::rngs::StdRng::seed_from_u64(1);
        let learner = PenalizedLogistic::lasso();
        let (model, _) = learner.fit_logistic(&x, &y, &mut fit_rng).unwrap();
        assert!(model.coefficients[0] > 0.8, "slope={}", model.coefficients[0]);
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(learner.output(), OutputKind::Probability);
    }

    #[test]
    fn test_logistic_rejects_constant_or_nonbinary_target() {
        let x = Matrix::from_rows((0..10).map(|i| vec![i as f64]).collect()).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let learner = PenalizedLogistic::lasso();
        assert!(matches!(
            learner.fit(&x, &[1.0; 10], &mut rng),
            Err(Error::DegenerateFold(_))
        ));
        let y: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();
        assert!(matches!(learner.fit(&x, &y, &mut rng), Err(Error::NuisanceFit { .. })));
    }
}
