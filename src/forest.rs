//! Random Forest
//!
//! Bagged ensemble of CART regression trees. Each tree is fitted on its own
//! bootstrap sample (or on every row) with a seed derived from the forest seed,
//! so a forest fitted twice on the same data is identical.
use crate::config::JsonIO;
use crate::constants::TREE_SEED_STRIDE;
use crate::data::Matrix;
use crate::errors::PcnError;
use crate::params::ForestParams;
use crate::sampler::SampleMethod;
use crate::tree::{DecisionTree, TreeConfig};
use crate::utils::is_constant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    pub params: ForestParams,
    pub seed: u64,
    pub trees: Vec<DecisionTree>,
    pub n_features: usize,
}

/// Seed of the `t`-th tree of a forest.
#[inline]
pub fn tree_seed(seed: u64, t: usize) -> u64 {
    seed.wrapping_add((t as u64).wrapping_add(1).wrapping_mul(TREE_SEED_STRIDE))
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams, seed: u64) -> Self {
        RandomForestRegressor {
            params,
            seed,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Fit the forest, replacing any previously fitted trees.
    ///
    /// Trees are fitted in parallel on the current rayon pool.
    ///
    /// * `data` - Column major feature matrix.
    /// * `y` - Target, one value per row.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64]) -> Result<(), PcnError> {
        self.params.validate()?;
        if data.rows == 0 || data.cols == 0 {
            return Err(PcnError::EmptyTable(format!(
                "a {} x {} matrix can not be fitted",
                data.rows, data.cols
            )));
        }
        if y.len() != data.rows {
            return Err(PcnError::ShapeMismatch(format!(
                "{} target values for {} rows",
                y.len(),
                data.rows
            )));
        }
        if (0..data.cols).all(|c| is_constant(data.get_col(c))) {
            return Err(PcnError::DegenerateFeatures(data.cols));
        }

        let config = TreeConfig {
            max_depth: self.params.max_depth,
            min_samples_split: self.params.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
            max_features: self.params.max_features.n_features(data.cols),
        };
        let method = SampleMethod::from_bootstrap(self.params.bootstrap);
        let index: Vec<usize> = (0..data.rows).collect();
        let seed = self.seed;

        let trees = (0..self.params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(seed, t));
                let (chosen, _) = method.sampler().sample(&mut rng, &index);
                DecisionTree::fit(data, y, &chosen, &config, &mut rng)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.trees = trees;
        self.n_features = data.cols;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Mean of the tree predictions.
    ///
    /// * `data` - Matrix with the columns the forest was fitted on.
    /// * `parallel` - Predict the trees in parallel.
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Result<Vec<f64>, PcnError> {
        if !self.is_fitted() {
            return Err(PcnError::InvalidParameter(
                "forest".to_string(),
                "a fitted forest".to_string(),
                "an unfitted forest".to_string(),
            ));
        }
        if data.cols != self.n_features {
            return Err(PcnError::ShapeMismatch(format!(
                "forest fitted on {} columns, predicting {}",
                self.n_features, data.cols
            )));
        }
        let per_tree: Vec<Vec<f64>> = if parallel {
            self.trees.par_iter().map(|t| t.predict(data)).collect()
        } else {
            self.trees.iter().map(|t| t.predict(data)).collect()
        };
        let mut preds = vec![0.0; data.rows];
        for p in per_tree.iter() {
            for (acc, v) in preds.iter_mut().zip(p) {
                *acc += v;
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(preds.into_iter().map(|p| p / n_trees).collect())
    }

    /// Impurity importances: the mean over the trees that split of their normalized
    /// squared error decrease. Sums to one, or all zeros when no tree split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        let mut n_split_trees = 0;
        for tree in self.trees.iter().filter(|t| t.n_splits() > 0) {
            n_split_trees += 1;
            for (acc, v) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        if n_split_trees == 0 {
            return importances;
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        importances
    }
}

impl JsonIO for RandomForestRegressor {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::mean_absolute_error;
    use crate::params::MaxFeatures;
    use crate::utils::precision_round;
    use rand::Rng;
    use tempfile::tempdir;

    fn data(n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(1);
        let x0: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
        let x1: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..10.0)).collect();
        let y: Vec<f64> = x0.iter().map(|v| 3.0 * v + 1.0).collect();
        let mut d = x0;
        d.extend(x1);
        (d, y)
    }

    #[test]
    fn test_forest_fit_predict() {
        let (d, y) = data(100);
        let m = Matrix::new(&d, 100, 2);
        let params = ForestParams::default().set_n_estimators(20);
        let mut forest = RandomForestRegressor::new(params, 42);
        forest.fit(&m, &y).unwrap();
        assert_eq!(forest.trees.len(), 20);
        let preds = forest.predict(&m, true).unwrap();
        assert!(mean_absolute_error(&y, &preds) < 1.0);

        let imp = forest.feature_importances();
        assert_eq!(precision_round(imp.iter().sum::<f64>(), 10), 1.0);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_forest_deterministic() {
        let (d, y) = data(50);
        let m = Matrix::new(&d, 50, 2);
        let params = ForestParams::default()
            .set_n_estimators(10)
            .set_max_features(MaxFeatures::Sqrt);
        let mut a = RandomForestRegressor::new(params, 7);
        let mut b = RandomForestRegressor::new(params, 7);
        a.fit(&m, &y).unwrap();
        b.fit(&m, &y).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict(&m, true).unwrap(), b.predict(&m, false).unwrap());
    }

    #[test]
    fn test_forest_without_bootstrap_sees_all_rows() {
        let (d, y) = data(30);
        let m = Matrix::new(&d, 30, 2);
        let params = ForestParams::default().set_n_estimators(3).set_bootstrap(false);
        let mut forest = RandomForestRegressor::new(params, 0);
        forest.fit(&m, &y).unwrap();
        let preds = forest.predict(&m, false).unwrap();
        // Fully grown trees on every row reproduce the training target.
        let preds: Vec<f64> = preds.iter().map(|p| precision_round(*p, 8)).collect();
        let y: Vec<f64> = y.iter().map(|p| precision_round(*p, 8)).collect();
        assert_eq!(preds, y);
    }

    #[test]
    fn test_forest_degenerate_features() {
        let d = vec![1.0; 10];
        let y: Vec<f64> = (0..5).map(|v| v as f64).collect();
        let m = Matrix::new(&d, 5, 2);
        let mut forest = RandomForestRegressor::new(ForestParams::default(), 0);
        let err = forest.fit(&m, &y).unwrap_err();
        assert!(matches!(err, PcnError::DegenerateFeatures(2)));
        assert!(err.is_fit_error());
    }

    #[test]
    fn test_forest_shape_errors() {
        let (d, y) = data(10);
        let m = Matrix::new(&d, 10, 2);
        let mut forest = RandomForestRegressor::new(ForestParams::default().set_n_estimators(2), 0);
        assert!(forest.predict(&m, false).is_err());
        assert!(matches!(
            forest.fit(&m, &y[..5]).unwrap_err(),
            PcnError::ShapeMismatch(_)
        ));
        forest.fit(&m, &y).unwrap();
        let one = Matrix::new(&d[..10], 10, 1);
        assert!(matches!(forest.predict(&one, false).unwrap_err(), PcnError::ShapeMismatch(_)));
    }

    #[test]
    fn test_forest_save_load() {
        let (d, y) = data(20);
        let m = Matrix::new(&d, 20, 2);
        let mut forest = RandomForestRegressor::new(ForestParams::default().set_n_estimators(3), 0);
        forest.fit(&m, &y).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("forest.json");
        forest.save_json(&path).unwrap();
        let loaded = RandomForestRegressor::load_json(&path).unwrap();
        assert_eq!(forest.predict(&m, false).unwrap(), loaded.predict(&m, false).unwrap());
    }
}
