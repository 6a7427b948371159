//! # dml-core
//!
//! Shared building blocks for cross-fitted (double/debiased machine
//! learning) causal estimators:
//!
//! - the [`Error`] taxonomy and [`Result`] alias,
//! - the dense [`Matrix`] and the observational sample [`DmlData`],
//! - the [`Learner`] / [`Predictor`] capability traits for nuisance models,
//! - sample splitting ([`FoldPartition`]).
//!
//! Estimation logic lives in `dml-inference`; concrete learners in
//! `dml-learners`. Both depend only on the traits defined here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod split;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use split::{FoldPartition, fold_sizes};
pub use traits::{Learner, OutputKind, Predictor};
pub use types::{DmlData, Matrix, is_binary};
