//! Post-LASSO: LASSO for variable selection, OLS refit on the selected
//! columns.

use dml_core::{Learner, Matrix, OutputKind, Predictor, Result};
use rand::RngCore;

use crate::linear::{LinearModel, least_squares};
use crate::penalized::{ElasticNet, Penalty};

/// LASSO selection followed by an unpenalized refit.
#[derive(Debug, Clone)]
pub struct PostLasso {
    /// Selection step (forced to `α = 1`).
    pub selector: ElasticNet,
}

impl Default for PostLasso {
    fn default() -> Self {
        Self { selector: ElasticNet::lasso().with_penalty(Penalty::plug_in()) }
    }
}

impl PostLasso {
    /// Post-LASSO with the given penalty rule for the selection step.
    pub fn new(penalty: Penalty) -> Self {
        Self { selector: ElasticNet::lasso().with_penalty(penalty) }
    }

    /// Columns with a non-zero LASSO coefficient.
    pub fn select(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Vec<usize>> {
        let mut selector = self.selector.clone();
        selector.alpha = 1.0;
        let (model, lambda) = selector.fit_linear(x, y, rng)?;
        let support = model.support();
        log::debug!(
            "post-lasso selected {} of {} columns (lambda={:.3e})",
            support.len(),
            x.ncols(),
            lambda
        );
        Ok(support)
    }
}

impl Learner for PostLasso {
    fn name(&self) -> &str {
        "post_lasso"
    }

    fn output(&self) -> OutputKind {
        OutputKind::Continuous
    }

    fn fit(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        let support = self.select(x, y, rng)?;
        let mut coefficients = vec![0.0; x.ncols()];
        let intercept = if support.is_empty() {
            y.iter().sum::<f64>() / y.len() as f64
        } else {
            let (b0, b) = least_squares(&x.select_columns(&support), y, true)?;
            for (&j, &bj) in support.iter().zip(&b) {
                coefficients[j] = bj;
            }
            b0
        };
        Ok(Box::new(LinearModel::identity(intercept, coefficients)))
    }
}
