use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

const MIN_IMPURITY_DECREASE: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Node {
    /// Class distribution for classification, a single mean for regression.
    Leaf { value: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    node = if x <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Targets<'a> {
    Classes { labels: &'a [usize], n_classes: usize },
    Values(&'a [f64]),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Number of candidate features drawn per split; `None` means all.
    pub max_features: Option<usize>,
}

struct Candidate {
    feature: usize,
    position: usize,
    threshold: f64,
    impurity: f64,
}

/// Grows a CART tree over `indices` (rows of `x`).
pub(crate) fn grow(
    x: &[Vec<f64>],
    targets: Targets<'_>,
    indices: &mut [usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Node {
    grow_node(x, targets, indices, 0, params, rng)
}

fn grow_node(
    x: &[Vec<f64>],
    targets: Targets<'_>,
    indices: &mut [usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut StdRng,
) -> Node {
    let parent_impurity = node_impurity(targets, indices);
    if depth >= params.max_depth
        || indices.len() < params.min_samples_split.max(2)
        || parent_impurity <= MIN_IMPURITY_DECREASE
    {
        return leaf(targets, indices);
    }

    let n_features = x.first().map(Vec::len).unwrap_or(0);
    let features: Vec<usize> = match params.max_features {
        Some(k) if k < n_features => index::sample(rng, n_features, k.max(1)).into_vec(),
        _ => (0..n_features).collect(),
    };

    let mut best: Option<Candidate> = None;
    for feature in features {
        if let Some(candidate) = best_split(x, targets, indices, feature) {
            let better = best
                .as_ref()
                .map_or(true, |current| candidate.impurity < current.impurity);
            if better {
                best = Some(candidate);
            }
        }
    }

    match best {
        Some(split) if split.impurity < parent_impurity - MIN_IMPURITY_DECREASE => {
            sort_by_feature(x, indices, split.feature);
            let (left, right) = indices.split_at_mut(split.position);
            Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(grow_node(x, targets, left, depth + 1, params, rng)),
                right: Box::new(grow_node(x, targets, right, depth + 1, params, rng)),
            }
        }
        _ => leaf(targets, indices),
    }
}

fn sort_by_feature(x: &[Vec<f64>], indices: &mut [usize], feature: usize) {
    indices.sort_by(|a, b| x[*a][feature].total_cmp(&x[*b][feature]));
}

fn leaf(targets: Targets<'_>, indices: &[usize]) -> Node {
    let value = match targets {
        Targets::Classes { labels, n_classes } => {
            let mut counts = vec![0.0; n_classes];
            for &index in indices {
                counts[labels[index]] += 1.0;
            }
            let total = indices.len().max(1) as f64;
            counts.iter().map(|count| count / total).collect()
        }
        Targets::Values(values) => {
            let total: f64 = indices.iter().map(|&index| values[index]).sum();
            vec![total / indices.len().max(1) as f64]
        }
    };
    Node::Leaf { value }
}

/// Weighted impurity of a node: n * gini for classes, SSE for values.
fn node_impurity(targets: Targets<'_>, indices: &[usize]) -> f64 {
    match targets {
        Targets::Classes { labels, n_classes } => {
            let mut counts = vec![0.0; n_classes];
            for &index in indices {
                counts[labels[index]] += 1.0;
            }
            weighted_gini(&counts, indices.len() as f64)
        }
        Targets::Values(values) => {
            let (sum, sum_sq) = indices.iter().fold((0.0, 0.0), |(s, sq), &index| {
                (s + values[index], sq + values[index] * values[index])
            });
            sse(sum, sum_sq, indices.len() as f64)
        }
    }
}

fn weighted_gini(counts: &[f64], n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts.iter().map(|count| count * count).sum();
    n - sum_sq / n
}

fn sse(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    (sum_sq - sum * sum / n).max(0.0)
}

fn best_split(
    x: &[Vec<f64>],
    targets: Targets<'_>,
    indices: &[usize],
    feature: usize,
) -> Option<Candidate> {
    let mut order = indices.to_vec();
    sort_by_feature(x, &mut order, feature);
    let n = order.len();
    let mut best: Option<Candidate> = None;

    let consider = |position: usize, impurity: f64, best: &mut Option<Candidate>| {
        let lower = x[order[position - 1]][feature];
        let upper = x[order[position]][feature];
        if lower >= upper {
            return;
        }
        if best.as_ref().map_or(true, |current| impurity < current.impurity) {
            *best = Some(Candidate {
                feature,
                position,
                threshold: lower + (upper - lower) / 2.0,
                impurity,
            });
        }
    };

    match targets {
        Targets::Classes { labels, n_classes } => {
            let mut right = vec![0.0; n_classes];
            for &index in &order {
                right[labels[index]] += 1.0;
            }
            let mut left = vec![0.0; n_classes];
            for position in 1..n {
                let label = labels[order[position - 1]];
                left[label] += 1.0;
                right[label] -= 1.0;
                let impurity = weighted_gini(&left, position as f64)
                    + weighted_gini(&right, (n - position) as f64);
                consider(position, impurity, &mut best);
            }
        }
        Targets::Values(values) => {
            let (total, total_sq) = order.iter().fold((0.0, 0.0), |(s, sq), &index| {
                (s + values[index], sq + values[index] * values[index])
            });
            let (mut left, mut left_sq) = (0.0, 0.0);
            for position in 1..n {
                let value = values[order[position - 1]];
                left += value;
                left_sq += value * value;
                let impurity = sse(left, left_sq, position as f64)
                    + sse(total - left, total_sq - left_sq, (n - position) as f64);
                consider(position, impurity, &mut best);
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 4,
            min_samples_split: 2,
            max_features: None,
        }
    }

    #[test]
    fn separable_classes_get_pure_leaves() {
        let x = vec![vec![0.1], vec![0.2], vec![0.8], vec![0.9]];
        let labels = [0, 0, 1, 1];
        let mut indices: Vec<usize> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = grow(
            &x,
            Targets::Classes {
                labels: &labels,
                n_classes: 2,
            },
            &mut indices,
            &params(),
            &mut rng,
        );

        assert_eq!(tree.leaf_value(&[0.15]), &[1.0, 0.0]);
        assert_eq!(tree.leaf_value(&[0.85]), &[0.0, 1.0]);
    }

    #[test]
    fn regression_leaves_hold_means() {
        let x = vec![vec![1.0], vec![2.0], vec![10.0], vec![11.0]];
        let values = [1.0, 3.0, 20.0, 22.0];
        let mut indices: Vec<usize> = (0..4).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = grow(
            &x,
            Targets::Values(&values),
            &mut indices,
            &TreeParams {
                max_depth: 1,
                ..params()
            },
            &mut rng,
        );

        assert_eq!(tree.leaf_value(&[0.0]), &[2.0]);
        assert_eq!(tree.leaf_value(&[50.0]), &[21.0]);
    }

    #[test]
    fn constant_features_produce_a_single_leaf() {
        let x = vec![vec![0.5]; 6];
        let labels = [0, 1, 0, 1, 0, 1];
        let mut indices: Vec<usize> = (0..6).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let tree = grow(
            &x,
            Targets::Classes {
                labels: &labels,
                n_classes: 2,
            },
            &mut indices,
            &params(),
            &mut rng,
        );
        assert!(matches!(tree, Node::Leaf { .. }));
    }
}
