use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{self, Node, Targets, TreeParams};
use super::{Classifier, Regressor, RANDOM_SEED};
use crate::error::{EngineError, Result};

fn check_shapes(x: &[Vec<f64>], n_targets: usize) -> Result<()> {
    if x.is_empty() {
        return Err(EngineError::Training("cannot fit on an empty sample".into()));
    }
    if x.len() != n_targets {
        return Err(EngineError::Training(format!(
            "feature rows ({}) and targets ({}) differ in length",
            x.len(),
            n_targets
        )));
    }
    let width = x[0].len();
    if x.iter().any(|row| row.len() != width) {
        return Err(EngineError::Training("ragged feature matrix".into()));
    }
    Ok(())
}

/// Bagged CART classifier with per-split feature subsampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub seed: u64,
    n_classes: usize,
    trees: Vec<Node>,
}

impl RandomForestClassifier {
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 5,
            seed: RANDOM_SEED,
            n_classes,
            trees: Vec::new(),
        }
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize]) -> Result<()> {
        check_shapes(x, y.len())?;
        if let Some(label) = y.iter().find(|&&label| label >= self.n_classes) {
            return Err(EngineError::Training(format!(
                "label {label} outside of {} classes",
                self.n_classes
            )));
        }

        let n = x.len();
        let n_features = x[0].len();
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: Some(((n_features as f64).sqrt().round() as usize).max(1)),
        };
        let targets = Targets::Classes {
            labels: y,
            n_classes: self.n_classes,
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.trees = (0..self.n_estimators)
            .map(|_| {
                let mut sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                tree::grow(x, targets, &mut sample, &params, &mut rng)
            })
            .collect();
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<usize> {
        self.predict_proba(x)
            .iter()
            .map(|probabilities| {
                let mut best = 0;
                for (class, probability) in probabilities.iter().enumerate() {
                    if *probability > probabilities[best] {
                        best = class;
                    }
                }
                best
            })
            .collect()
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter()
            .map(|row| {
                let mut totals = vec![0.0; self.n_classes];
                for tree in &self.trees {
                    for (total, p) in totals.iter_mut().zip(tree.leaf_value(row)) {
                        *total += p;
                    }
                }
                let count = self.trees.len().max(1) as f64;
                totals.into_iter().map(|total| total / count).collect()
            })
            .collect()
    }
}

/// Least-squares gradient boosting over shallow regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub seed: u64,
    init: f64,
    trees: Vec<Node>,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            seed: RANDOM_SEED,
            init: 0.0,
            trees: Vec::new(),
        }
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        check_shapes(x, y.len())?;

        let n = x.len();
        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.init = y.iter().sum::<f64>() / n as f64;
        let mut predictions = vec![self.init; n];
        self.trees.clear();

        for _ in 0..self.n_estimators {
            let residuals: Vec<f64> = y
                .iter()
                .zip(&predictions)
                .map(|(target, prediction)| target - prediction)
                .collect();
            let mut indices: Vec<usize> = (0..n).collect();
            let stage = tree::grow(x, Targets::Values(&residuals), &mut indices, &params, &mut rng);
            for (prediction, row) in predictions.iter_mut().zip(x) {
                *prediction += self.learning_rate * stage.leaf_value(row)[0];
            }
            self.trees.push(stage);
        }
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| {
                self.trees.iter().fold(self.init, |acc, stage| {
                    acc + self.learning_rate * stage.leaf_value(row)[0]
                })
            })
            .collect()
    }
}
