//! Generic cross-fitting harness.
//!
//! For each fold the nuisance learners are fitted on the other folds and
//! evaluated on the held-out fold only; a [`MomentStrategy`] turns those
//! held-out predictions into per-unit records. Records come back in
//! original unit order, exactly one per unit.
//!
//! Randomness: one seed per fold is drawn from the caller's generator, in
//! fold order, before any fitting starts. Fold `f` then owns
//! `StdRng::seed_from_u64(seed_f)`, so sequential and parallel runs produce
//! the same records.

use dml_core::{DmlData, Error, FoldPartition, Learner, Matrix, OutputKind, Result, is_binary};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;

/// Share of clipped propensities above which a warning is logged.
const CLIP_WARN_SHARE: f64 = 0.1;

/// A per-unit record that knows which unit it belongs to.
pub trait Indexed {
    /// Original (0-based) unit index.
    fn index(&self) -> usize;
}

/// Model-specific part of cross-fitting: which nuisances to fit and how to
/// combine their held-out predictions.
pub trait MomentStrategy: Sync {
    /// Per-unit output.
    type Record: Indexed + Send;

    /// Short model name for logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the model needs an instrument.
    fn requires_instrument(&self) -> bool {
        false
    }

    /// Model-specific input checks (binary treatment / instrument, ...).
    fn validate(&self, _data: &DmlData) -> Result<()> {
        Ok(())
    }

    /// Fit on the training folds, return one record per held-out unit.
    fn fold_records(&self, fold: &FoldView<'_>, rng: &mut StdRng) -> Result<Vec<Self::Record>>;
}

/// Training / held-out view of one fold.
#[derive(Debug)]
pub struct FoldView<'a> {
    /// Full sample.
    pub data: &'a DmlData,
    /// Fold number.
    pub fold: usize,
    /// Training units (all other folds).
    pub train: Vec<usize>,
    /// Held-out units.
    pub test: &'a [usize],
    /// Propensity clipping bound.
    pub clip: f64,
}

impl FoldView<'_> {
    /// Training covariates.
    pub fn x_train(&self) -> Matrix {
        self.data.x().select_rows(&self.train)
    }

    /// Held-out covariates.
    pub fn x_test(&self) -> Matrix {
        self.data.x().select_rows(self.test)
    }

    /// Training slice of a per-unit vector.
    pub fn train_values(&self, v: &[f64]) -> Vec<f64> {
        self.train.iter().map(|&i| v[i]).collect()
    }

    /// Held-out slice of a per-unit vector.
    pub fn test_values(&self, v: &[f64]) -> Vec<f64> {
        self.test.iter().map(|&i| v[i]).collect()
    }

    /// Clip propensities in place to `[clip, 1 − clip]`.
    pub fn clip_propensities(&self, role: &str, values: &mut [f64]) {
        let n_clipped = clip_propensities(values, self.clip);
        if !values.is_empty() && n_clipped as f64 / values.len() as f64 > CLIP_WARN_SHARE {
            log::warn!(
                "fold {}: {} of {} {} predictions clipped to [{}, {}]",
                self.fold,
                n_clipped,
                values.len(),
                role,
                self.clip,
                1.0 - self.clip
            );
        }
    }
}

/// Clip to `[clip, 1 − clip]`; returns how many values were moved.
pub fn clip_propensities(values: &mut [f64], clip: f64) -> usize {
    let mut n = 0;
    for v in values.iter_mut() {
        let c = v.clamp(clip, 1.0 - clip);
        if c != *v {
            n += 1;
            *v = c;
        }
    }
    n
}

/// Fit `learner` on `(x_train, y_train)` and predict every matrix in
/// `x_eval`.
///
/// Probability learners need a non-constant 0/1 target. Learner failures
/// are reported as [`Error::NuisanceFit`] tagged with `role`; degenerate
/// folds keep their own variant.
pub fn fit_predict(
    learner: &dyn Learner,
    role: &str,
    x_train: &Matrix,
    y_train: &[f64],
    x_eval: &[&Matrix],
    rng: &mut StdRng,
) -> Result<Vec<Vec<f64>>> {
    if learner.output() == OutputKind::Probability {
        if !is_binary(y_train) {
            return Err(Error::nuisance(
                learner.name(),
                format!("{role}: probability learner needs a 0/1 target"),
            ));
        }
        if y_train.iter().all(|v| *v == y_train[0]) {
            return Err(Error::DegenerateFold(format!(
                "{role}: training target is constant ({}) for classifier {}",
                y_train[0],
                learner.name()
            )));
        }
    }

    let model = learner.fit(x_train, y_train, rng).map_err(|e| match e {
        Error::DegenerateFold(_) | Error::NuisanceFit { .. } => e,
        other => Error::nuisance(learner.name(), format!("{role}: {other}")),
    })?;

    x_eval
        .iter()
        .map(|x| {
            let pred = model
                .predict(x)
                .map_err(|e| Error::nuisance(learner.name(), format!("{role}: {e}")))?;
            if pred.len() != x.nrows() {
                return Err(Error::nuisance(
                    learner.name(),
                    format!("{role}: {} predictions for {} rows", pred.len(), x.nrows()),
                ));
            }
            if pred.iter().any(|v| !v.is_finite()) {
                return Err(Error::nuisance(
                    learner.name(),
                    format!("{role}: non-finite prediction"),
                ));
            }
            Ok(pred)
        })
        .collect()
}

/// Single-matrix form of [`fit_predict`].
pub fn fit_predict_one(
    learner: &dyn Learner,
    role: &str,
    x_train: &Matrix,
    y_train: &[f64],
    x_test: &Matrix,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let mut out = fit_predict(learner, role, x_train, y_train, &[x_test], rng)?;
    Ok(out.swap_remove(0))
}

/// Check a propensity clipping bound.
pub fn validate_clip(clip: f64) -> Result<()> {
    if clip > 0.0 && clip < 0.5 {
        Ok(())
    } else {
        Err(Error::Validation(format!("clip must be in (0, 0.5), got {clip}")))
    }
}

/// Require a 0/1 vector.
pub(crate) fn require_binary(model: &str, what: &str, v: &[f64]) -> Result<()> {
    if is_binary(v) {
        Ok(())
    } else {
        Err(Error::InputShape(format!("{model} requires a binary (0/1) {what}")))
    }
}

/// Split predictions made at a binary column set to 0 and to 1.
pub(crate) fn pair_at(mut preds: Vec<Vec<f64>>) -> Result<[Vec<f64>; 2]> {
    match (preds.pop(), preds.pop()) {
        (Some(at1), Some(at0)) if preds.is_empty() => Ok([at0, at1]),
        _ => Err(Error::InputShape("expected predictions at 0 and at 1".into())),
    }
}

/// Run `strategy` over every fold of `partition`.
///
/// Returns one record per unit, position `i` holding unit `i`.
pub fn run_folds<S: MomentStrategy>(
    data: &DmlData,
    strategy: &S,
    partition: &FoldPartition,
    clip: f64,
    rng: &mut dyn RngCore,
    parallel: bool,
) -> Result<Vec<S::Record>> {
    let n = data.n_obs();
    if partition.n_obs() != n {
        return Err(Error::InputShape(format!(
            "partition covers {} units, sample has {}",
            partition.n_obs(),
            n
        )));
    }
    if strategy.requires_instrument() {
        data.instrument()?;
    }
    strategy.validate(data)?;
    validate_clip(clip)?;

    let k = partition.n_folds();
    let seeds: Vec<u64> = (0..k).map(|_| rng.next_u64()).collect();

    let run_fold = |f: usize| -> Result<Vec<S::Record>> {
        let view = FoldView {
            data,
            fold: f,
            train: partition.train_indices(f),
            test: partition.test_indices(f),
            clip,
        };
        log::debug!(
            "{}: fold {}/{} train={} test={}",
            strategy.name(),
            f + 1,
            k,
            view.train.len(),
            view.test.len()
        );
        let mut fold_rng = StdRng::seed_from_u64(seeds[f]);
        let records = strategy.fold_records(&view, &mut fold_rng)?;
        if records.len() != view.test.len() {
            return Err(Error::InputShape(format!(
                "{}: fold {} produced {} records for {} held-out units",
                strategy.name(),
                f,
                records.len(),
                view.test.len()
            )));
        }
        Ok(records)
    };

    let per_fold: Vec<Vec<S::Record>> = if parallel {
        (0..k).into_par_iter().map(run_fold).collect::<Result<_>>()?
    } else {
        (0..k).map(run_fold).collect::<Result<_>>()?
    };

    let mut slots: Vec<Option<S::Record>> = (0..n).map(|_| None).collect();
    for record in per_fold.into_iter().flatten() {
        let i = record.index();
        match slots.get_mut(i) {
            Some(slot @ None) => *slot = Some(record),
            Some(Some(_)) => {
                return Err(Error::InputShape(format!("unit {i} received two records")));
            }
            None => return Err(Error::InputShape(format!("record index {i} out of range"))),
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.ok_or_else(|| Error::InputShape(format!("unit {i} received no record"))))
        .collect()
}
