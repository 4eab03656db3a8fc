use std::collections::BTreeSet;

pub fn accuracy(truth: &[usize], predicted: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth
        .iter()
        .zip(predicted)
        .filter(|(expected, actual)| expected == actual)
        .count();
    hits as f64 / truth.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Support-weighted precision, recall and F1. Classes with an empty
/// denominator score 0.
pub fn weighted_scores(truth: &[usize], predicted: &[usize]) -> WeightedScores {
    let labels: BTreeSet<usize> = truth.iter().chain(predicted).copied().collect();
    let mut totals = WeightedScores {
        precision: 0.0,
        recall: 0.0,
        f1: 0.0,
    };
    let mut total_support = 0.0;

    for label in labels {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (expected, actual) in truth.iter().zip(predicted) {
            match (*expected == label, *actual == label) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                (false, false) => {}
            }
        }
        let support = tp + fn_;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = ratio(2.0 * precision * recall, precision + recall);

        totals.precision += precision * support;
        totals.recall += recall * support;
        totals.f1 += f1 * support;
        total_support += support;
    }

    if total_support == 0.0 {
        return totals;
    }
    WeightedScores {
        precision: totals.precision / total_support,
        recall: totals.recall / total_support,
        f1: totals.f1 / total_support,
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn mean_absolute_error(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let total: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(expected, actual)| (expected - actual).abs())
        .sum();
    total / truth.len() as f64
}

/// Coefficient of determination. A constant target scores 1 when predicted
/// exactly and 0 otherwise.
pub fn r2_score(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let residual: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(expected, actual)| (expected - actual).powi(2))
        .sum();
    let total: f64 = truth.iter().map(|expected| (expected - mean).powi(2)).sum();

    if total == 0.0 {
        return if residual == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - residual / total
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
