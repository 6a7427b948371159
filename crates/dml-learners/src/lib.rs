//! # dml-learners
//!
//! Nuisance learners for the cross-fitting estimators in `dml-inference`.
//! Every learner implements [`dml_core::Learner`]:
//!
//! - [`LinearRegression`]: OLS (min-norm least squares via SVD)
//! - [`ElasticNet`]: LASSO / elastic net by coordinate descent, with fixed,
//!   cross-validated or plug-in penalty ([`Penalty`])
//! - [`PenalizedLogistic`]: L1 / elastic-net logistic regression (IRLS)
//! - [`PostLasso`]: LASSO selection + OLS refit
//! - [`RandomForest`]: bagged CART trees (regression or classification)
//! - [`ConstantMean`]: training mean
//!
//! [`LearnerKind`] maps a family name to a concrete learner for a given
//! output kind.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod baseline;
pub mod forest;
pub mod linear;
pub mod penalized;
pub mod post_lasso;
pub mod registry;
mod tree;

pub use baseline::{ConstantMean, ConstantModel};
pub use forest::{ForestModel, ForestTask, MaxFeatures, RandomForest};
pub use linear::{LinearModel, LinearRegression, least_squares};
pub use penalized::{ElasticNet, PenalizedLogistic, Penalty, plug_in_gamma};
pub use post_lasso::PostLasso;
pub use registry::LearnerKind;
