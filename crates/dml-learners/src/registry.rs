//! Named learner families, resolved to a concrete learner per output kind.

use dml_core::{Learner, OutputKind};
use serde::{Deserialize, Serialize};

use crate::{
    ConstantMean, ElasticNet, LinearRegression, PenalizedLogistic, PostLasso, RandomForest,
};

/// Learner family used for every nuisance function of an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    /// OLS (linear probability model for probability nuisances).
    Ols,
    /// LASSO (`α = 1`), cross-validated λ; L1 logistic for probabilities.
    Lasso,
    /// Elastic net (`α = 0.5`), cross-validated λ; logistic elastic net for
    /// probabilities.
    ElasticNet,
    /// Post-LASSO with plug-in λ; L1 logistic for probabilities.
    PostLasso,
    /// Random forest regressor / classifier.
    Forest,
    /// Training mean.
    Mean,
}

impl LearnerKind {
    /// Concrete learner for a nuisance with the given output kind.
    pub fn build(self, output: OutputKind) -> Box<dyn Learner> {
        let prob = output == OutputKind::Probability;
        match self {
            LearnerKind::Ols if prob => Box::new(LinearRegression::linear_probability()),
            LearnerKind::Ols => Box::new(LinearRegression::new()),
            LearnerKind::Lasso | LearnerKind::PostLasso if prob => {
                Box::new(PenalizedLogistic::lasso())
            }
            LearnerKind::Lasso => Box::new(ElasticNet::lasso()),
            LearnerKind::PostLasso => Box::new(PostLasso::default()),
            LearnerKind::ElasticNet if prob => Box::new(PenalizedLogistic::new(0.5)),
            LearnerKind::ElasticNet => Box::new(ElasticNet::new(0.5)),
            LearnerKind::Forest if prob => Box::new(RandomForest::classifier()),
            LearnerKind::Forest => Box::new(RandomForest::regressor()),
            LearnerKind::Mean if prob => Box::new(ConstantMean::classifier()),
            LearnerKind::Mean => Box::new(ConstantMean::regressor()),
        }
    }
}
