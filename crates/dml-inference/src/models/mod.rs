//! The four DML models and their per-unit records.

pub mod iivm;
pub mod irm;
pub mod pliv;
pub mod plr;

use std::fmt;

use dml_core::{DmlData, FoldPartition, OutputKind, Result, is_binary};
use dml_learners::LearnerKind;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Estimate, RobustVariance};
use crate::crossfit::{MomentStrategy, run_folds};

pub use iivm::{Iivm, IivmOptions, IivmRecord};
pub use irm::{Irm, IrmRecord};
pub use pliv::{Pliv, PlivRecord};
pub use plr::{Plr, PlrRecord};

/// Default propensity clipping bound.
pub const DEFAULT_CLIP: f64 = 0.01;

/// Which model to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Partially linear regression.
    Plr,
    /// Interactive regression model (ATE).
    Irm,
    /// Partially linear IV.
    Pliv,
    /// Interactive IV model (mean of the IIVM score).
    Iivm,
}

impl ModelKind {
    /// Whether the model needs an instrument column.
    pub fn requires_instrument(self) -> bool {
        matches!(self, ModelKind::Pliv | ModelKind::Iivm)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Plr => "plr",
            ModelKind::Irm => "irm",
            ModelKind::Pliv => "pliv",
            ModelKind::Iivm => "iivm",
        })
    }
}

/// A model together with its nuisance learners.
pub enum Model {
    /// Partially linear regression.
    Plr(Plr),
    /// Interactive regression model.
    Irm(Irm),
    /// Partially linear IV.
    Pliv(Pliv),
    /// Interactive IV model.
    Iivm(Iivm),
}

impl Model {
    /// Model tag.
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::Plr(_) => ModelKind::Plr,
            Model::Irm(_) => ModelKind::Irm,
            Model::Pliv(_) => ModelKind::Pliv,
            Model::Iivm(_) => ModelKind::Iivm,
        }
    }

    /// Use one learner family for every nuisance.
    ///
    /// Propensities of binary variables get the family's classifier; the
    /// PLR / PLIV treatment regression uses it too when `D` is binary.
    pub fn from_learner_kind(
        kind: ModelKind,
        learner: LearnerKind,
        data: &DmlData,
        iivm_options: IivmOptions,
    ) -> Self {
        let reg = || learner.build(OutputKind::Continuous);
        let clf = || learner.build(OutputKind::Probability);
        let treatment = || if is_binary(data.d()) { clf() } else { reg() };
        match kind {
            ModelKind::Plr => Model::Plr(Plr::new(reg(), treatment())),
            ModelKind::Irm => Model::Irm(Irm::new(reg(), clf())),
            ModelKind::Pliv => Model::Pliv(Pliv::new(reg(), treatment(), clf())),
            ModelKind::Iivm => {
                Model::Iivm(Iivm::new(reg(), clf(), clf()).with_options(iivm_options))
            }
        }
    }

    /// Cross-fit this model on `partition` with an explicit clipping bound.
    pub fn cross_fit(
        &self,
        data: &DmlData,
        partition: &FoldPartition,
        clip: f64,
        rng: &mut dyn RngCore,
        parallel: bool,
    ) -> Result<CrossFitRecords> {
        Ok(match self {
            Model::Plr(s) => {
                CrossFitRecords::Plr(run_folds(data, s, partition, clip, rng, parallel)?)
            }
            Model::Irm(s) => {
                CrossFitRecords::Irm(run_folds(data, s, partition, clip, rng, parallel)?)
            }
            Model::Pliv(s) => {
                CrossFitRecords::Pliv(run_folds(data, s, partition, clip, rng, parallel)?)
            }
            Model::Iivm(s) => {
                CrossFitRecords::Iivm(run_folds(data, s, partition, clip, rng, parallel)?)
            }
        })
    }

    pub(crate) fn validate(&self, data: &DmlData) -> Result<()> {
        fn check<S: MomentStrategy>(s: &S, data: &DmlData) -> Result<()> {
            if s.requires_instrument() {
                data.instrument()?;
            }
            s.validate(data)
        }
        match self {
            Model::Plr(s) => check(s, data),
            Model::Irm(s) => check(s, data),
            Model::Pliv(s) => check(s, data),
            Model::Iivm(s) => check(s, data),
        }
    }
}

/// Cross-fit `model` with the default clipping bound (0.01).
///
/// Returns one record per unit; position `i` holds unit `i`.
pub fn cross_fit(
    data: &DmlData,
    model: &Model,
    partition: &FoldPartition,
    rng: &mut dyn RngCore,
    parallel: bool,
) -> Result<CrossFitRecords> {
    model.cross_fit(data, partition, DEFAULT_CLIP, rng, parallel)
}

/// Per-unit records of one cross-fitting run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "model", content = "records", rename_all = "lowercase")]
pub enum CrossFitRecords {
    /// PLR records.
    Plr(Vec<PlrRecord>),
    /// IRM records.
    Irm(Vec<IrmRecord>),
    /// PLIV records.
    Pliv(Vec<PlivRecord>),
    /// IIVM records.
    Iivm(Vec<IivmRecord>),
}

impl CrossFitRecords {
    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            CrossFitRecords::Plr(r) => r.len(),
            CrossFitRecords::Irm(r) => r.len(),
            CrossFitRecords::Pliv(r) => r.len(),
            CrossFitRecords::Iivm(r) => r.len(),
        }
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unit indices in record order.
    pub fn indices(&self) -> Vec<usize> {
        match self {
            CrossFitRecords::Plr(r) => r.iter().map(|x| x.index).collect(),
            CrossFitRecords::Irm(r) => r.iter().map(|x| x.index).collect(),
            CrossFitRecords::Pliv(r) => r.iter().map(|x| x.index).collect(),
            CrossFitRecords::Iivm(r) => r.iter().map(|x| x.index).collect(),
        }
    }

    /// Final-stage estimate for these records.
    pub fn estimate(&self, variance: RobustVariance, conf_level: f64) -> Result<Estimate> {
        match self {
            CrossFitRecords::Plr(r) => plr::estimate(r, variance, conf_level),
            CrossFitRecords::Irm(r) => irm::estimate(r, variance, conf_level),
            CrossFitRecords::Pliv(r) => pliv::estimate(r, variance, conf_level),
            CrossFitRecords::Iivm(r) => iivm::estimate(r, variance, conf_level),
        }
    }
}
