//! Estimator configuration.

use dml_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::{RobustVariance, validate_conf_level};
use crate::crossfit::validate_clip;
use crate::models::DEFAULT_CLIP;

/// Configuration of [`crate::DoubleMl`].
///
/// Missing fields in a JSON config fall back to the defaults:
///
/// ```
/// let cfg: dml_inference::DmlConfig = serde_json::from_str(r#"{"n_rep": 5}"#).unwrap();
/// assert_eq!(cfg.n_folds, 3);
/// assert_eq!(cfg.n_rep, 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmlConfig {
    /// Number of cross-fitting folds.
    pub n_folds: usize,
    /// Number of independent partitions (repetitions).
    pub n_rep: usize,
    /// Propensity clipping bound, in `(0, 0.5)`.
    pub clip: f64,
    /// Seed for partitions and learners; fresh OS entropy when `None`.
    pub seed: Option<u64>,
    /// Run the fold loop on the rayon pool.
    pub parallel_folds: bool,
    /// Robust covariance used in the final stage.
    pub variance: RobustVariance,
    /// Confidence level of the reported interval.
    pub conf_level: f64,
}

impl Default for DmlConfig {
    fn default() -> Self {
        Self {
            n_folds: 3,
            n_rep: 1,
            clip: DEFAULT_CLIP,
            seed: None,
            parallel_folds: false,
            variance: RobustVariance::Hc1,
            conf_level: 0.95,
        }
    }
}

impl DmlConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(Error::Validation(format!("n_folds must be >= 2, got {}", self.n_folds)));
        }
        if self.n_rep == 0 {
            return Err(Error::Validation("n_rep must be >= 1".into()));
        }
        validate_clip(self.clip)?;
        validate_conf_level(self.conf_level)
    }
}
