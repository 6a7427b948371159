//! Error types for the cross-fitting estimators

use thiserror::Error;

/// Error type shared by all `dml-*` crates.
///
/// Every variant is fatal for the call that produced it: no partial results
/// are returned and nothing is retried internally.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Mismatched vector / matrix shapes, missing or malformed inputs.
    #[error("Input shape error: {0}")]
    InputShape(String),

    /// A fold is too small (or too homogeneous) to fit a nuisance model on.
    #[error("Degenerate fold: {0}")]
    DegenerateFold(String),

    /// A nuisance learner failed to fit or produced unusable predictions.
    #[error("Nuisance fit error ({learner}): {message}")]
    NuisanceFit {
        /// Learner name (e.g. "lasso", "random_forest").
        learner: String,
        /// What went wrong.
        message: String,
    },

    /// A downstream quantity is undefined or non-finite (singular design,
    /// zero-variance residuals, ...).
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Invalid configuration value.
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Shorthand for [`Error::NuisanceFit`].
    pub fn nuisance(learner: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NuisanceFit { learner: learner.into(), message: message.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nuisance_display() {
        let e = Error::nuisance("lasso", "did not converge");
        assert_eq!(e.to_string(), "Nuisance fit error (lasso): did not converge");
    }

    #[test]
    fn test_io_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
