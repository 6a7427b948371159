//! Constant-mean learner: predicts the training mean everywhere.

use dml_core::{Error, Learner, Matrix, OutputKind, Predictor, Result};
use rand::RngCore;

/// Predicts the mean of the training target.
#[derive(Debug, Clone, Copy)]
pub struct ConstantMean {
    output: OutputKind,
}

impl ConstantMean {
    /// Continuous output.
    pub fn regressor() -> Self {
        Self { output: OutputKind::Continuous }
    }

    /// Probability output (the class-1 share).
    pub fn classifier() -> Self {
        Self { output: OutputKind::Probability }
    }
}

impl Learner for ConstantMean {
    fn name(&self) -> &str {
        "mean"
    }

    fn output(&self) -> OutputKind {
        self.output
    }

    fn fit(&self, x: &Matrix, y: &[f64], _rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        if y.is_empty() || y.len() != x.nrows() {
            return Err(Error::InputShape(format!(
                "mean: y length ({}) must equal n ({}) and be non-zero",
                y.len(),
                x.nrows()
            )));
        }
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        Ok(Box::new(ConstantModel { value: mean }))
    }
}

/// Fitted constant.
#[derive(Debug, Clone, Copy)]
pub struct ConstantModel {
    /// Predicted value.
    pub value: f64,
}

impl Predictor for ConstantModel {
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        Ok(vec![self.value; x.nrows()])
    }
}
