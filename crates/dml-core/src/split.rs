//! Sample splitting for cross-fitting.
//!
//! A [`FoldPartition`] assigns each of the `n` units to exactly one of `k`
//! disjoint, non-empty folds. Partitions are either drawn from a
//! caller-supplied RNG or injected from an explicit assignment.

use rand::RngCore;
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// Partition of `0..n` into `k` disjoint, non-empty folds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPartition {
    fold_of: Vec<usize>,
    folds: Vec<Vec<usize>>, // ascending unit indices per fold
}

/// Fold sizes for `n` units and `k` folds.
///
/// The first `k-1` folds hold `round(n/k)` units and the last fold the
/// remainder. If rounding up would leave the last fold empty, `floor(n/k)`
/// is used for the first `k-1` folds instead.
pub fn fold_sizes(n: usize, k: usize) -> Result<Vec<usize>> {
    if k < 2 {
        return Err(Error::Validation(format!("n_folds must be >= 2, got {k}")));
    }
    if n < k {
        return Err(Error::DegenerateFold(format!(
            "cannot split {n} observations into {k} non-empty folds"
        )));
    }
    let mut base = (n as f64 / k as f64).round() as usize;
    if base * (k - 1) >= n {
        base = n / k;
    }
    let mut sizes = vec![base; k];
    sizes[k - 1] = n - base * (k - 1);
    Ok(sizes)
}

impl FoldPartition {
    /// Draw a uniformly random partition: shuffle `0..n`, then cut
    /// consecutive blocks of [`fold_sizes`].
    pub fn random(n: usize, k: usize, rng: &mut dyn RngCore) -> Result<Self> {
        let sizes = fold_sizes(n, k)?;
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut fold_of = vec![0usize; n];
        let mut start = 0;
        for (f, &size) in sizes.iter().enumerate() {
            for &i in &order[start..start + size] {
                fold_of[i] = f;
            }
            start += size;
        }
        Self::from_assignment(fold_of, k)
    }

    /// Use a fixed assignment (`fold_of[i]` is the fold of unit `i`).
    pub fn from_assignment(fold_of: Vec<usize>, k: usize) -> Result<Self> {
        if k < 2 {
            return Err(Error::Validation(format!("n_folds must be >= 2, got {k}")));
        }
        let mut folds = vec![Vec::new(); k];
        for (i, &f) in fold_of.iter().enumerate() {
            if f >= k {
                return Err(Error::Validation(format!("unit {i} assigned to fold {f} >= {k}")));
            }
            folds[f].push(i);
        }
        if let Some(f) = folds.iter().position(|v| v.is_empty()) {
            return Err(Error::DegenerateFold(format!("fold {f} is empty")));
        }
        Ok(Self { fold_of, folds })
    }

    /// Number of folds.
    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }

    /// Number of units.
    pub fn n_obs(&self) -> usize {
        self.fold_of.len()
    }

    /// Fold of unit `i`.
    pub fn fold_of(&self, i: usize) -> usize {
        self.fold_of[i]
    }

    /// Held-out units of fold `f` (ascending).
    pub fn test_indices(&self, f: usize) -> &[usize] {
        &self.folds[f]
    }

    /// Training units for fold `f`: every unit not in fold `f` (ascending).
    pub fn train_indices(&self, f: usize) -> Vec<usize> {
        (0..self.n_obs()).filter(|&i| self.fold_of[i] != f).collect()
    }

    /// Sizes of all folds.
    pub fn sizes(&self) -> Vec<usize> {
        self.folds.iter().map(Vec::len).collect()
    }
}
