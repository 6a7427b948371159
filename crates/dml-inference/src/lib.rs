//! # dml-inference
//!
//! Double/debiased machine learning with K-fold cross-fitting.
//!
//! - [`crossfit`]: the generic harness ([`MomentStrategy`], [`fit_predict`])
//! - [`models`]: PLR, IRM, PLIV and IIVM strategies and their per-unit records
//! - [`aggregate`]: robust final-stage regressions and [`Estimate`]
//! - [`dml`]: [`DoubleMl`]: partitions, repetitions, median aggregation
//! - [`iv`]: 2SLS and post-LASSO IV
//! - [`simulate`]: synthetic data with a known structural effect
//!
//! ```no_run
//! use dml_core::DmlData;
//! use dml_inference::{DmlConfig, DoubleMl, IivmOptions, Model, ModelKind};
//! use dml_learners::LearnerKind;
//!
//! let data = DmlData::from_path("data.json")?;
//! let model =
//!     Model::from_learner_kind(ModelKind::Plr, LearnerKind::Lasso, &data, IivmOptions::default());
//! let config = DmlConfig { seed: Some(7), ..Default::default() };
//! let result = DoubleMl::new(model, config)?.fit(&data)?;
//! println!("theta = {:.4} ± {:.4}", result.estimate.coef, result.estimate.se);
//! # Ok::<(), dml_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod config;
pub mod crossfit;
pub mod dml;
pub mod iv;
pub mod models;
pub mod simulate;

pub use aggregate::{Estimate, OlsFit, RobustVariance, aggregate_repetitions, ols_robust};
pub use config::DmlConfig;
pub use crossfit::{FoldView, Indexed, MomentStrategy, clip_propensities, fit_predict, run_folds};
pub use dml::{DmlResult, DoubleMl};
pub use iv::{
    FirstStage, IvDesign, IvResult, PostLassoIvConfig, PostLassoIvResult, iv_2sls, post_lasso_iv,
};
pub use models::{
    CrossFitRecords, DEFAULT_CLIP, Iivm, IivmOptions, IivmRecord, Irm, IrmRecord, Model,
    ModelKind, Pliv, PlivRecord, Plr, PlrRecord, cross_fit,
};
pub use simulate::{SimulationConfig, simulate};
