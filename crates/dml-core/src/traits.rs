//! Learner capability traits
//!
//! The cross-fitting harness only ever talks to nuisance models through
//! these two traits, so new learners plug in without touching the
//! estimators.

use rand::RngCore;

use crate::{Matrix, Result};

/// What a learner's predictions mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Real-valued regression output.
    Continuous,
    /// Probability of class 1 for a 0/1 target.
    Probability,
}

/// Untrained nuisance learner (a configuration).
pub trait Learner: Send + Sync {
    /// Short identifier used in logs and errors (e.g. "lasso").
    fn name(&self) -> &str;

    /// Output kind of the fitted predictor.
    fn output(&self) -> OutputKind;

    /// Fit on `(x, y)`. Any randomness (bootstrap draws, CV folds, feature
    /// sub-sampling) must come from `rng`.
    fn fit(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>>;
}

/// Fitted nuisance model.
pub trait Predictor: Send + Sync {
    /// One prediction per row of `x`.
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct Zero;
    struct ZeroModel;

    impl Learner for Zero {
        fn name(&self) -> &str {
            "zero"
        }

        fn output(&self) -> OutputKind {
            OutputKind::Continuous
        }

        fn fit(
            &self,
            _x: &Matrix,
            _y: &[f64],
            _rng: &mut dyn RngCore,
        ) -> Result<Box<dyn Predictor>> {
            Ok(Box::new(ZeroModel))
        }
    }

    impl Predictor for ZeroModel {
        fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
            Ok(vec![0.0; x.nrows()])
        }
    }

    #[test]
    fn test_learner_object_safety() {
        let learner: Box<dyn Learner> = Box::new(Zero);
        let x = Matrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let model = learner.fit(&x, &[1.0, 2.0], &mut rng).unwrap();
        assert_eq!(model.predict(&x).unwrap(), vec![0.0, 0.0]);
        assert_eq!(learner.name(), "zero");
    }
}
