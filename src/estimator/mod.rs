//! Numerical estimators behind the prediction models.
//!
//! The models only depend on the [`Classifier`] and [`Regressor`] contracts;
//! the tree ensembles in this module are the implementations shipped with
//! the engine.

mod ensemble;
mod tree;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::Result;

pub use ensemble::{GradientBoostingRegressor, RandomForestClassifier};

pub const RANDOM_SEED: u64 = 42;

pub trait Classifier {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize]) -> Result<()>;

    fn predict(&self, x: &[Vec<f64>]) -> Vec<usize>;

    /// One probability row per input row, one column per class.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>>;
}

pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    fn predict(&self, x: &[Vec<f64>]) -> Vec<f64>;
}

/// Shuffled train/test index split. The test partition holds
/// `ceil(n * test_fraction)` rows.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let n_test = n_test.min(n);
    let train = indices.split_off(n_test);
    (train, indices)
}

pub fn take_rows<T: Clone>(rows: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&index| rows[index].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_eighty_twenty_and_disjoint() {
        let (train, test) = train_test_split(50, 0.2, RANDOM_SEED);
        assert_eq!(train.len(), 40);
        assert_eq!(test.len(), 10);

        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn split_rounds_test_size_up() {
        let (train, test) = train_test_split(11, 0.2, RANDOM_SEED);
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 8);
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        assert_eq!(
            train_test_split(120, 0.2, RANDOM_SEED),
            train_test_split(120, 0.2, RANDOM_SEED)
        );
    }
}
