//! End-to-end estimator: partition, cross-fit, final stage, repetitions.

use dml_core::{DmlData, Error, FoldPartition, Result};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;

use crate::aggregate::{Estimate, aggregate_repetitions};
use crate::config::DmlConfig;
use crate::models::{CrossFitRecords, Model, ModelKind};

/// Result of [`DoubleMl::fit`].
#[derive(Debug, Clone, Serialize)]
pub struct DmlResult {
    /// Estimated model.
    pub model: ModelKind,
    /// Aggregated estimate (median over repetitions).
    #[serde(flatten)]
    pub estimate: Estimate,
    /// Folds per repetition.
    pub n_folds: usize,
    /// Number of repetitions.
    pub n_rep: usize,
    /// Seed actually used.
    pub seed: u64,
    /// Per-repetition estimates.
    pub repetitions: Vec<Estimate>,
}

/// Double/debiased machine-learning estimator.
pub struct DoubleMl {
    model: Model,
    config: DmlConfig,
}

impl DoubleMl {
    /// Pair a model with a validated configuration.
    pub fn new(model: Model, config: DmlConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { model, config })
    }

    /// The model being estimated.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The configuration.
    pub fn config(&self) -> &DmlConfig {
        &self.config
    }

    /// Fit with `config.seed` (or a fresh seed when unset).
    pub fn fit(&self, data: &DmlData) -> Result<DmlResult> {
        let seed = match self.config.seed {
            Some(s) => s,
            None => StdRng::from_os_rng().next_u64(),
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let mut result = self.fit_with_rng(data, &mut rng)?;
        result.seed = seed;
        Ok(result)
    }

    /// Fit drawing every partition and learner seed from `rng`.
    ///
    /// The reported `seed` is 0; use [`DoubleMl::fit`] to record it.
    pub fn fit_with_rng(&self, data: &DmlData, rng: &mut dyn RngCore) -> Result<DmlResult> {
        let cfg = &self.config;
        self.model.validate(data)?;
        let n = data.n_obs();
        if n < cfg.n_folds {
            return Err(Error::DegenerateFold(format!(
                "{n} observations for {} folds",
                cfg.n_folds
            )));
        }

        let mut repetitions = Vec::with_capacity(cfg.n_rep);
        for rep in 0..cfg.n_rep {
            let partition = FoldPartition::random(n, cfg.n_folds, rng)?;
            let (_, est) = self.fit_partition(data, &partition, rng)?;
            log::debug!(
                "{} repetition {}/{}: coef={:.6} se={:.6}",
                self.model.kind(),
                rep + 1,
                cfg.n_rep,
                est.coef,
                est.se
            );
            repetitions.push(est);
        }

        let estimate = aggregate_repetitions(&repetitions, cfg.conf_level)?;
        Ok(DmlResult {
            model: self.model.kind(),
            estimate,
            n_folds: cfg.n_folds,
            n_rep: cfg.n_rep,
            seed: 0,
            repetitions,
        })
    }

    /// One cross-fitting run on a caller-supplied partition.
    pub fn fit_partition(
        &self,
        data: &DmlData,
        partition: &FoldPartition,
        rng: &mut dyn RngCore,
    ) -> Result<(CrossFitRecords, Estimate)> {
        let cfg = &self.config;
        let records = self.model.cross_fit(data, partition, cfg.clip, rng, cfg.parallel_folds)?;
        let estimate = records.estimate(cfg.variance, cfg.conf_level).inspect_err(|e| {
            log::warn!("{}: final stage failed: {e}", self.model.kind());
        })?;
        Ok((records, estimate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dml_learners::LinearRegression;

    use crate::models::Plr;

    fn linear_data(n: usize) -> DmlData {
        let x: Vec<Vec<f64>> = (0..n).map(|i| vec![(i % 7) as f64, (i % 5) as f64]).collect();
        let d: Vec<f64> = x.iter().enumerate().map(|(i, r)| r[0] - r[1] + (i % 3) as f64).collect();
        let y: Vec<f64> = x.iter().zip(&d).map(|(r, d)| 1.5 * d + r[0] + 2.0 * r[1]).collect();
        DmlData::from_rows(x, y, d, None).unwrap()
    }

    fn ols_plr() -> Model {
        Model::Plr(Plr::new(Box::new(LinearRegression::new()), Box::new(LinearRegression::new())))
    }

    #[test]
    fn test_fit_recovers_linear_effect() {
        let cfg = DmlConfig { seed: Some(11), n_rep: 3, ..Default::default() };
        let res = DoubleMl::new(ols_plr(), cfg).unwrap().fit(&linear_data(60)).unwrap();
        assert!((res.estimate.coef - 1.5).abs() < 1e-8);
        assert_eq!(res.repetitions.len(), 3);
        assert_eq!(res.seed, 11);
        assert_eq!(res.model, ModelKind::Plr);
    }

    #[test]
    fn test_too_few_observations() {
        let cfg = DmlConfig { seed: Some(1), n_folds: 5, ..Default::default() };
        let err = DoubleMl::new(ols_plr(), cfg).unwrap().fit(&linear_data(4)).unwrap_err();
        assert!(matches!(err, Error::DegenerateFold(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = DmlConfig { n_rep: 0, ..Default::default() };
        assert!(matches!(DoubleMl::new(ols_plr(), cfg), Err(Error::Validation(_))));
    }
}
