//! Decision Tree
//!
//! CART regression tree grown on squared error. Nodes are stored in a flat arena,
//! the root is at index 0.
use crate::data::Matrix;
use crate::errors::PcnError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
        n_samples: usize,
    },
}

/// Growth limits of a single tree, `max_features` already resolved to a count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
    pub n_features: usize,
    pub depth: usize,
    /// Total squared error decrease contributed by each feature.
    impurity_decrease: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

/// Sum of squared deviations from the mean.
#[inline]
fn sse(sum: f64, sum_sq: f64, n: usize) -> f64 {
    (sum_sq - sum * sum / n as f64).max(0.0)
}

struct TreeBuilder<'a, 'b> {
    data: &'a Matrix<'b, f64>,
    y: &'a [f64],
    config: &'a TreeConfig,
    rng: &'a mut StdRng,
    features: Vec<usize>,
    nodes: Vec<TreeNode>,
    impurity_decrease: Vec<f64>,
    depth: usize,
}

impl<'a, 'b> TreeBuilder<'a, 'b> {
    fn leaf(&mut self, sum: f64, n: usize) -> usize {
        self.nodes.push(TreeNode::Leaf {
            value: sum / n as f64,
            n_samples: n,
        });
        self.nodes.len() - 1
    }

    fn build(&mut self, index: Vec<usize>, depth: usize) -> usize {
        self.depth = self.depth.max(depth);
        let n = index.len();
        let (sum, sum_sq) = index
            .iter()
            .fold((0.0, 0.0), |(s, q), &i| (s + self.y[i], q + self.y[i] * self.y[i]));
        let node_sse = sse(sum, sum_sq, n);

        let depth_reached = self.config.max_depth.map_or(false, |d| depth >= d);
        if depth_reached
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || node_sse / n as f64 <= f64::EPSILON
        {
            return self.leaf(sum, n);
        }

        let split = match self.best_split(&index, node_sse) {
            Some(s) => s,
            None => return self.leaf(sum, n),
        };
        let col = self.data.get_col(split.feature);
        let (left_index, right_index): (Vec<usize>, Vec<usize>) =
            index.iter().copied().partition(|&i| col[i] <= split.threshold);
        if left_index.is_empty() || right_index.is_empty() {
            return self.leaf(sum, n);
        }

        self.impurity_decrease[split.feature] += split.decrease;
        let node_idx = self.nodes.len();
        // placeholder until both children exist
        self.nodes.push(TreeNode::Leaf {
            value: sum / n as f64,
            n_samples: n,
        });
        let left = self.build(left_index, depth + 1);
        let right = self.build(right_index, depth + 1);
        self.nodes[node_idx] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_idx
    }

    /// Best midpoint split over a fresh random subset of the features. Features that are
    /// constant within the node do not count towards `max_features`.
    fn best_split(&mut self, index: &[usize], node_sse: f64) -> Option<SplitCandidate> {
        self.features.shuffle(&mut *self.rng);
        let n = index.len();
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for &feature in self.features.iter() {
            if visited >= self.config.max_features {
                break;
            }
            let col = self.data.get_col(feature);
            pairs.clear();
            pairs.extend(index.iter().map(|&i| (col[i], self.y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
            if pairs[0].0 == pairs[n - 1].0 {
                continue;
            }
            visited += 1;

            let (total, total_sq) = pairs.iter().fold((0.0, 0.0), |(s, q), p| (s + p.1, q + p.1 * p.1));
            let mut left = 0.0;
            let mut left_sq = 0.0;
            for i in 0..(n - 1) {
                left += pairs[i].1;
                left_sq += pairs[i].1 * pairs[i].1;
                let n_left = i + 1;
                // Equal or unordered (NaN) neighbours can not be separated.
                let separable = pairs[i].0.partial_cmp(&pairs[i + 1].0) == Some(Ordering::Less);
                if !separable || n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }
                let children = sse(left, left_sq, n_left) + sse(total - left, total_sq - left_sq, n - n_left);
                let decrease = node_sse - children;
                if best.as_ref().map_or(true, |b| decrease > b.decrease) {
                    let mut threshold = (pairs[i].0 + pairs[i + 1].0) / 2.0;
                    // The midpoint of two adjacent floats can round up to the larger one.
                    if threshold >= pairs[i + 1].0 {
                        threshold = pairs[i].0;
                    }
                    if !threshold.is_finite() {
                        continue;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        decrease: decrease.max(0.0),
                    });
                }
            }
        }
        best
    }
}

impl DecisionTree {
    /// Fit a tree on the rows of `data` listed in `index`. Rows may be repeated.
    ///
    /// * `data` - Column major feature matrix.
    /// * `y` - Target, one value per row of `data`.
    /// * `index` - Rows to fit on.
    /// * `config` - Growth limits.
    /// * `rng` - Source of the per split feature subsets.
    pub fn fit(
        data: &Matrix<f64>,
        y: &[f64],
        index: &[usize],
        config: &TreeConfig,
        rng: &mut StdRng,
    ) -> Result<Self, PcnError> {
        if index.is_empty() || data.cols == 0 {
            return Err(PcnError::EmptyTable("no rows or columns to fit a tree on".to_string()));
        }
        if y.len() != data.rows {
            return Err(PcnError::ShapeMismatch(format!(
                "{} target values for {} rows",
                y.len(),
                data.rows
            )));
        }
        if config.max_features == 0 {
            return Err(PcnError::InvalidParameter(
                "max_features".to_string(),
                "at least one feature".to_string(),
                "0".to_string(),
            ));
        }

        let mut builder = TreeBuilder {
            data,
            y,
            config,
            rng,
            features: (0..data.cols).collect(),
            nodes: Vec::new(),
            impurity_decrease: vec![0.0; data.cols],
            depth: 0,
        };
        builder.build(index.to_vec(), 0);
        Ok(DecisionTree {
            nodes: builder.nodes,
            n_features: data.cols,
            depth: builder.depth,
            impurity_decrease: builder.impurity_decrease,
        })
    }

    /// Predict a single row of a matrix.
    pub fn predict_row(&self, data: &Matrix<f64>, row: usize) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if *data.get(row, *feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict(&self, data: &Matrix<f64>) -> Vec<f64> {
        (0..data.rows).map(|r| self.predict_row(data, r)).collect()
    }

    pub fn n_splits(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Split { .. }))
            .count()
    }

    /// Squared error decrease per feature, normalized to sum to one.
    /// All zeros when the tree never split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.impurity_decrease.iter().sum();
        if total > 0.0 {
            self.impurity_decrease.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; self.n_features]
        }
    }
}

impl Display for DecisionTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<(usize, usize)> = vec![(0, 0)];
        let mut r = String::new();
        while let Some((idx, depth)) = print_buffer.pop() {
            let pad = "      ".repeat(depth);
            match &self.nodes[idx] {
                TreeNode::Leaf { value, n_samples } => {
                    r += format!("{}{}:leaf={},n={}\n", pad, idx, value, n_samples).as_str();
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    r += format!("{}{}:[{} <= {}] yes={},no={}\n", pad, idx, feature, threshold, left, right).as_str();
                    print_buffer.push((*right, depth + 1));
                    print_buffer.push((*left, depth + 1));
                }
            }
        }
        write!(f, "{}", r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config() -> TreeConfig {
        TreeConfig {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    #[test]
    fn test_tree_fits_step_function() {
        // Column 0 drives the target, column 1 is noise.
        let data = vec![1., 2., 3., 4., 5., 6., 0., 1., 0., 1., 0., 1.];
        let y = vec![1., 1., 1., 10., 10., 10.];
        let m = Matrix::new(&data, 6, 2);
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&m, &y, &[0, 1, 2, 3, 4, 5], &config(), &mut rng).unwrap();
        println!("{}", tree);
        assert_eq!(tree.predict(&m), y);
        assert_eq!(tree.n_splits(), 1);
        match &tree.nodes[0] {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 3.5);
            }
            _ => panic!("root should split"),
        }
        assert_eq!(tree.feature_importances(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_tree_limits() {
        let data = vec![1., 2., 3., 4., 5., 6., 7., 8.];
        let y = vec![1., 2., 3., 4., 5., 6., 7., 8.];
        let m = Matrix::new(&data, 8, 1);
        let index: Vec<usize> = (0..8).collect();
        let mut rng = StdRng::seed_from_u64(0);

        let mut c = config();
        c.max_depth = Some(1);
        let tree = DecisionTree::fit(&m, &y, &index, &c, &mut rng).unwrap();
        assert_eq!(tree.depth, 1);
        assert_eq!(tree.n_splits(), 1);

        let mut c = config();
        c.min_samples_leaf = 4;
        let tree = DecisionTree::fit(&m, &y, &index, &c, &mut rng).unwrap();
        for node in tree.nodes.iter() {
            if let TreeNode::Leaf { n_samples, .. } = node {
                assert!(*n_samples >= 4);
            }
        }

        let mut c = config();
        c.min_samples_split = 9;
        let tree = DecisionTree::fit(&m, &y, &index, &c, &mut rng).unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.predict_row(&m, 0), 4.5);
        assert_eq!(tree.feature_importances(), vec![0.0]);
    }

    #[test]
    fn test_tree_constant_feature_is_a_leaf() {
        let data = vec![1., 1., 1., 1.];
        let y = vec![1., 2., 3., 4.];
        let m = Matrix::new(&data, 4, 1);
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&m, &y, &[0, 1, 2, 3], &config(), &mut rng).unwrap();
        assert_eq!(tree.n_splits(), 0);
    }

    #[test]
    fn test_tree_non_finite_feature_is_a_leaf() {
        let inf = f64::INFINITY;
        let data = vec![-inf, inf, -inf, inf, f64::NAN, f64::NAN, f64::NAN, f64::NAN];
        let y = vec![1., 2., 3., 4.];
        let m = Matrix::new(&data, 4, 2);
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&m, &y, &[0, 1, 2, 3], &config(), &mut rng).unwrap();
        assert_eq!(tree.n_splits(), 0);
        assert_eq!(tree.predict_row(&m, 0), 2.5);
    }

    #[test]
    fn test_tree_skips_infinite_midpoints() {
        let data = vec![1., 2., f64::INFINITY, f64::INFINITY];
        let y = vec![1., 1., 10., 10.];
        let m = Matrix::new(&data, 4, 1);
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&m, &y, &[0, 1, 2, 3], &config(), &mut rng).unwrap();
        for node in tree.nodes.iter() {
            if let TreeNode::Split { threshold, .. } = node {
                assert!(threshold.is_finite());
            }
        }
    }

    #[test]
    fn test_tree_fit_errors() {
        let data = vec![1., 2.];
        let m = Matrix::new(&data, 2, 1);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            DecisionTree::fit(&m, &[1.0], &[0, 1], &config(), &mut rng).unwrap_err(),
            PcnError::ShapeMismatch(_)
        ));
        assert!(matches!(
            DecisionTree::fit(&m, &[1.0, 2.0], &[], &config(), &mut rng).unwrap_err(),
            PcnError::EmptyTable(_)
        ));
    }
}
