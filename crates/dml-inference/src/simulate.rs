//! Synthetic data with a known structural effect `θ` for each model.
//!
//! Covariates are Gaussian with Toeplitz correlation `0.7^|j−k|`, drawn as
//! an AR(1) across columns. The nuisance surfaces are non-linear in `x1`
//! and `x3`:
//!
//! - PLR: `D = x1 + ¼·σ(x3) + v`, `Y = θD + σ(x1) + ¼·x3 + ε`
//! - IRM: `D ~ Bernoulli(σ(½x1 − ¼x2 + ¼x3))`, `Y = θD + x1 + ½·x2² + ε`
//! - PLIV: `Z ~ Bernoulli(σ(½x1))`, `D = Z + ½x1 + u + v`,
//!   `Y = θD + σ(x1) + ¼·x3 + u + ε` (`u` confounds `D` and `Y`)
//! - IIVM: `Z ~ Bernoulli(σ(½x1))`, `D = 1{−½ + 1.5Z + ½x2 + u + v > 0}`,
//!   `Y = θD + x1 + ½·x3 + u + ε`
//!
//! where `σ` is the logistic function and `u, v, ε ~ N(0, 1)`.
//!
//! PLR, IRM and PLIV estimates target `θ`. The IIVM estimate is the mean of
//! the IIVM score, which is a different quantity on these samples.

use dml_core::{DmlData, Error, Matrix, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::models::ModelKind;

const X_CORR: f64 = 0.7;

/// Parameters of a synthetic sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Model whose assumptions the data satisfy.
    pub model: ModelKind,
    /// Number of observations.
    pub n_obs: usize,
    /// Number of covariates (at least 3).
    pub n_features: usize,
    /// True effect.
    pub theta: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self { model: ModelKind::Plr, n_obs: 500, n_features: 10, theta: 0.5, seed: 42 }
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn bernoulli(rng: &mut StdRng, p: f64) -> f64 {
    if rng.random::<f64>() < p { 1.0 } else { 0.0 }
}

fn covariates(rng: &mut StdRng, n: usize, p: usize) -> Vec<Vec<f64>> {
    let scale = (1.0 - X_CORR * X_CORR).sqrt();
    (0..n)
        .map(|_| {
            let mut row = Vec::with_capacity(p);
            let mut prev: f64 = StandardNormal.sample(rng);
            row.push(prev);
            for _ in 1..p {
                let e: f64 = StandardNormal.sample(rng);
                prev = X_CORR * prev + scale * e;
                row.push(prev);
            }
            row
        })
        .collect()
}

/// Draw a sample for `config.model`.
pub fn simulate(config: &SimulationConfig) -> Result<DmlData> {
    let SimulationConfig { model, n_obs: n, n_features: p, theta, seed } = *config;
    if n == 0 {
        return Err(Error::Validation("n_obs must be > 0".into()));
    }
    if p < 3 {
        return Err(Error::Validation(format!("n_features must be >= 3, got {p}")));
    }
    if !theta.is_finite() {
        return Err(Error::Validation("theta must be finite".into()));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let x = covariates(&mut rng, n, p);
    let mut y = Vec::with_capacity(n);
    let mut d = Vec::with_capacity(n);
    let mut z = Vec::with_capacity(n);

    for row in &x {
        let (x1, x2, x3) = (row[0], row[1], row[2]);
        let mut noise = || -> f64 { StandardNormal.sample(&mut rng) };
        let (u, v, eps) = (noise(), noise(), noise());
        match model {
            ModelKind::Plr => {
                let di = x1 + 0.25 * sigmoid(x3) + v;
                d.push(di);
                y.push(theta * di + sigmoid(x1) + 0.25 * x3 + eps);
            }
            ModelKind::Irm => {
                let di = bernoulli(&mut rng, sigmoid(0.5 * x1 - 0.25 * x2 + 0.25 * x3));
                d.push(di);
                y.push(theta * di + x1 + 0.5 * x2 * x2 + eps);
            }
            ModelKind::Pliv => {
                let zi = bernoulli(&mut rng, sigmoid(0.5 * x1));
                let di = zi + 0.5 * x1 + u + v;
                z.push(zi);
                d.push(di);
                y.push(theta * di + sigmoid(x1) + 0.25 * x3 + u + eps);
            }
            ModelKind::Iivm => {
                let zi = bernoulli(&mut rng, sigmoid(0.5 * x1));
                let di = if -0.5 + 1.5 * zi + 0.5 * x2 + u + v > 0.0 { 1.0 } else { 0.0 };
                z.push(zi);
                d.push(di);
                y.push(theta * di + x1 + 0.5 * x3 + u + eps);
            }
        }
    }

    let z = model.requires_instrument().then_some(z);
    DmlData::new(Matrix::from_rows(x)?, y, d, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dml_core::is_binary;

    #[test]
    fn test_shapes_per_model() {
        for model in [ModelKind::Plr, ModelKind::Irm, ModelKind::Pliv, ModelKind::Iivm] {
            let cfg = SimulationConfig { model, n_obs: 50, n_features: 4, ..Default::default() };
            let data = simulate(&cfg).unwrap();
            assert_eq!(data.n_obs(), 50);
            assert_eq!(data.n_features(), 4);
            assert_eq!(data.z().is_some(), model.requires_instrument());
            if matches!(model, ModelKind::Irm | ModelKind::Iivm) {
                assert!(is_binary(data.d()));
            }
            if let Some(z) = data.z() {
                assert!(is_binary(z));
            }
        }
    }

    #[test]
    fn test_seeded() {
        let cfg = SimulationConfig { n_obs: 20, ..Default::default() };
        assert_eq!(simulate(&cfg).unwrap().y(), simulate(&cfg).unwrap().y());
    }

    #[test]
    fn test_covariate_correlation() {
        let mut rng = StdRng::seed_from_u64(1);
        let x = covariates(&mut rng, 20_000, 3);
        let c01 = x.iter().map(|r| r[0] * r[1]).sum::<f64>() / x.len() as f64;
        let c02 = x.iter().map(|r| r[0] * r[2]).sum::<f64>() / x.len() as f64;
        assert!((c01 - 0.7).abs() < 0.05, "corr(x1,x2)={c01}");
        assert!((c02 - 0.49).abs() < 0.05, "corr(x1,x3)={c02}");
    }

    #[test]
    fn test_rejects_too_few_features() {
        let cfg = SimulationConfig { n_features: 2, ..Default::default() };
        assert!(matches!(simulate(&cfg), Err(Error::Validation(_))));
    }
}
