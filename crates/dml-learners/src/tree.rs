//! CART regression tree used by the random forest.
//!
//! Splits maximise the reduction in squared error. For 0/1 targets this is
//! the same criterion as Gini impurity (`2p(1−p)` vs `p(1−p)` per node), so
//! one builder serves both regression and classification forests.

use dml_core::Matrix;
use rand::Rng;
use rand::rngs::StdRng;

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_features: usize,
    pub min_samples_leaf: usize,
    pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

struct Pending {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl RegressionTree {
    /// Grow a tree on `rows` (may contain repeats from bootstrapping).
    pub(crate) fn fit(
        x: &Matrix,
        y: &[f64],
        rows: Vec<usize>,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut stack = vec![Pending { node: 0, rows, depth: 0 }];

        while let Some(Pending { node, rows, depth }) = stack.pop() {
            let value = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
            let pure = rows.iter().all(|&i| y[i] == y[rows[0]]);
            let depth_reached = params.max_depth.is_some_and(|d| depth >= d);
            if pure || depth_reached || rows.len() < 2 * params.min_samples_leaf {
                nodes[node] = Node::Leaf { value };
                continue;
            }

            let Some(split) = best_split(x, y, &rows, params, rng) else {
                nodes[node] = Node::Leaf { value };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&i| x.get(i, split.feature) <= split.threshold);
            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node] =
                Node::Split { feature: split.feature, threshold: split.threshold, left, right };
            stack.push(Pending { node: left, rows: left_rows, depth: depth + 1 });
            stack.push(Pending { node: right, rows: right_rows, depth: depth + 1 });
        }

        Self { nodes }
    }

    pub(crate) fn predict_row(&self, row: &[f64]) -> f64 {
        let mut k = 0;
        loop {
            match self.nodes[k] {
                Node::Leaf { value } => return value,
                Node::Split { feature, threshold, left, right } => {
                    k = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[cfg(test)]
    fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

/// Best split over a random subset of `max_features` features. The score
/// `S_L²/n_L + S_R²/n_R` is equivalent to minimising the children's SSE.
fn best_split(
    x: &Matrix,
    y: &[f64],
    rows: &[usize],
    params: TreeParams,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let p = x.ncols();
    let m = params.max_features.clamp(1, p);
    let features = rand::seq::index::sample(rng, p, m);

    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;
    let min_leaf = params.min_samples_leaf.max(1);

    let mut best: Option<BestSplit> = None;
    let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);
    for feature in features.iter() {
        sorted.clear();
        sorted.extend(rows.iter().map(|&i| (x.get(i, feature), y[i])));
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        if sorted[0].0 == sorted[n - 1].0 {
            continue;
        }

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += sorted[k].1;
            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf || sorted[k].0 == sorted[k + 1].0 {
                continue;
            }
            let right_sum = total - left_sum;
            let score =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if score > parent_score + 1e-12 && best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(BestSplit {
                    feature,
                    threshold: 0.5 * (sorted[k].0 + sorted[k + 1].0),
                    score,
                });
            }
        }
    }
    best
}

/// Bootstrap sample of size `n` drawn with replacement.
pub(crate) fn bootstrap_rows(n: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..n).map(|_| rng.random_range(0..n)).collect()
}
