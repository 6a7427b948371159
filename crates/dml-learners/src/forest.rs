//! Random forest regression / classification.
//!
//! Bagged CART trees with per-split feature sub-sampling. Each tree gets its
//! own `StdRng` seeded from the caller's generator before any tree is grown,
//! so parallel and sequential growth give identical forests.

use dml_core::{Error, Learner, Matrix, OutputKind, Predictor, Result, is_binary};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tree::{RegressionTree, TreeParams, bootstrap_rows};

/// Number of candidate features per split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// All features.
    All,
    /// `⌊√p⌋` (at least 1).
    Sqrt,
    /// `⌊p/3⌋` (at least 1).
    Third,
    /// `⌈f·p⌉` for `f ∈ (0, 1]`.
    Fraction(f64),
    /// Fixed count (capped at p).
    Count(usize),
}

impl MaxFeatures {
    fn resolve(self, p: usize) -> Result<usize> {
        let m = match self {
            MaxFeatures::All => p,
            MaxFeatures::Sqrt => (p as f64).sqrt().floor() as usize,
            MaxFeatures::Third => p / 3,
            MaxFeatures::Fraction(f) => {
                if !(f > 0.0 && f <= 1.0) {
                    return Err(Error::Validation(format!(
                        "max_features fraction must be in (0, 1], got {f}"
                    )));
                }
                (f * p as f64).ceil() as usize
            }
            MaxFeatures::Count(k) => k,
        };
        Ok(m.clamp(1, p.max(1)))
    }
}

/// Regression or classification forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForestTask {
    /// Mean of leaf targets.
    Regression,
    /// Share of class 1 in the leaves (target must be 0/1).
    Classification,
}

/// Random forest learner.
#[derive(Debug, Clone)]
pub struct RandomForest {
    /// Regression or classification.
    pub task: ForestTask,
    /// Number of trees.
    pub n_trees: usize,
    /// Candidate features per split.
    pub max_features: MaxFeatures,
    /// Minimum number of (bootstrap) rows per leaf.
    pub min_samples_leaf: usize,
    /// Optional depth limit.
    pub max_depth: Option<usize>,
    /// Grow trees on bootstrap samples (otherwise on the full training set).
    pub bootstrap: bool,
    /// Grow trees on the rayon pool.
    pub parallel: bool,
}

impl RandomForest {
    /// Regression forest: 500 trees, `p/3` features, leaves of at least 5.
    pub fn regressor() -> Self {
        Self {
            task: ForestTask::Regression,
            n_trees: 500,
            max_features: MaxFeatures::Third,
            min_samples_leaf: 5,
            max_depth: None,
            bootstrap: true,
            parallel: true,
        }
    }

    /// Classification forest: 500 trees, `√p` features, leaves of at least 1.
    pub fn classifier() -> Self {
        Self {
            task: ForestTask::Classification,
            max_features: MaxFeatures::Sqrt,
            min_samples_leaf: 1,
            ..Self::regressor()
        }
    }

    /// Set the number of trees.
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the feature sub-sampling rule.
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the minimum leaf size.
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the depth limit.
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Toggle parallel tree growth.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn validate(&self, x: &Matrix, y: &[f64]) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::Validation("n_trees must be >= 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::Validation("min_samples_leaf must be >= 1".into()));
        }
        if y.len() != x.nrows() {
            return Err(Error::InputShape(format!(
                "y length ({}) != n ({})",
                y.len(),
                x.nrows()
            )));
        }
        if x.nrows() == 0 {
            return Err(Error::DegenerateFold(format!("{}: empty training set", self.name())));
        }
        if self.task == ForestTask::Classification {
            if !is_binary(y) {
                return Err(Error::nuisance(self.name(), "classification target must be 0/1"));
            }
            if y.iter().all(|v| *v == y[0]) {
                return Err(Error::DegenerateFold(format!(
                    "{}: training target is constant ({})",
                    self.name(),
                    y[0]
                )));
            }
        }
        Ok(())
    }
}

impl Learner for RandomForest {
    fn name(&self) -> &str {
        match self.task {
            ForestTask::Regression => "random_forest",
            ForestTask::Classification => "random_forest_classifier",
        }
    }

    fn output(&self) -> OutputKind {
        match self.task {
            ForestTask::Regression => OutputKind::Continuous,
            ForestTask::Classification => OutputKind::Probability,
        }
    }

    fn fit(&self, x: &Matrix, y: &[f64], rng: &mut dyn RngCore) -> Result<Box<dyn Predictor>> {
        self.validate(x, y)?;
        let n = x.nrows();
        let params = TreeParams {
            max_features: self.max_features.resolve(x.ncols())?,
            min_samples_leaf: self.min_samples_leaf,
            max_depth: self.max_depth,
        };
        let seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.next_u64()).collect();

        let grow = |seed: &u64| {
            let mut tree_rng = StdRng::seed_from_u64(*seed);
            let rows =
                if self.bootstrap { bootstrap_rows(n, &mut tree_rng) } else { (0..n).collect() };
            RegressionTree::fit(x, y, rows, params, &mut tree_rng)
        };
        let trees: Vec<RegressionTree> = if self.parallel {
            seeds.par_iter().map(grow).collect()
        } else {
            seeds.iter().map(grow).collect()
        };

        log::debug!("{}: grew {} trees on {} rows", self.name(), trees.len(), n);
        Ok(Box::new(ForestModel { trees, n_features: x.ncols() }))
    }
}

/// Fitted forest: average of tree predictions.
#[derive(Debug, Clone)]
pub struct ForestModel {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl Predictor for ForestModel {
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(Error::InputShape(format!(
                "forest was fitted on {} features, X has {}",
                self.n_features,
                x.ncols()
            )));
        }
        let k = self.trees.len() as f64;
        Ok((0..x.nrows())
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / k
            })
            .collect())
    }
}
