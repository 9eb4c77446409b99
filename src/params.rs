//! Forest Parameters
//!
//! Hyperparameters of the random forest, and the discrete domains the search
//! samples them from.
use crate::config::JsonIO;
use crate::errors::PcnError;
use crate::utils::{items_to_strings, validate_float_parameter, validate_min_usize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least one.
    Sqrt,
    /// `floor(log2(n_features))`, at least one.
    Log2,
    /// `floor(f * n_features)`, at least one.
    Fraction(f64),
    /// Every feature.
    All,
}

impl MaxFeatures {
    /// Resolve the policy against the number of available features.
    pub fn n_features(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::Fraction(f) => (f * n).floor() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }

    pub fn validate(&self) -> Result<(), PcnError> {
        if let MaxFeatures::Fraction(f) = self {
            if f.is_nan() || *f <= 0.0 || *f > 1.0 {
                return Err(PcnError::InvalidParameter(
                    "max_features".to_string(),
                    "fraction within (0, 1]".to_string(),
                    f.to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for MaxFeatures {
    type Err = PcnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqrt" => Ok(MaxFeatures::Sqrt),
            "log2" => Ok(MaxFeatures::Log2),
            "all" => Ok(MaxFeatures::All),
            _ => match s.parse::<f64>() {
                Ok(f) => {
                    let m = MaxFeatures::Fraction(f);
                    m.validate()?;
                    Ok(m)
                }
                Err(_) => Err(PcnError::ParseString(
                    s.to_string(),
                    "MaxFeatures".to_string(),
                    items_to_strings(vec!["sqrt", "log2", "all", "a fraction within (0, 1]"]),
                )),
            },
        }
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => write!(f, "sqrt"),
            MaxFeatures::Log2 => write!(f, "log2"),
            MaxFeatures::Fraction(v) => write!(f, "{}", v),
            MaxFeatures::All => write!(f, "all"),
        }
    }
}

/// Hyperparameters of a random forest regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Features considered at each split.
    pub max_features: MaxFeatures,
    /// Maximum depth of each tree, unbounded when `None`.
    pub max_depth: Option<usize>,
    /// Minimum number of rows required to split a node.
    pub min_samples_split: usize,
    /// Minimum number of rows in each leaf.
    pub min_samples_leaf: usize,
    /// Whether each tree is fitted on a bootstrap sample of the rows.
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 100,
            max_features: MaxFeatures::All,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), PcnError> {
        validate_min_usize(self.n_estimators, 1, "n_estimators")?;
        self.max_features.validate()?;
        if let Some(d) = self.max_depth {
            validate_min_usize(d, 1, "max_depth")?;
        }
        validate_min_usize(self.min_samples_split, 2, "min_samples_split")?;
        validate_min_usize(self.min_samples_leaf, 1, "min_samples_leaf")?;
        Ok(())
    }

    /// Set the number of trees.
    /// * `n_estimators` - Number of trees in the forest.
    pub fn set_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the feature sampling policy.
    /// * `max_features` - Features considered at each split.
    pub fn set_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the maximum depth.
    /// * `max_depth` - Maximum depth of each tree, `None` for unbounded trees.
    pub fn set_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn set_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    pub fn set_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn set_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let depth = match self.max_depth {
            Some(d) => d.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "n_estimators={}, max_features={}, max_depth={}, min_samples_split={}, min_samples_leaf={}, bootstrap={}",
            self.n_estimators, self.max_features, depth, self.min_samples_split, self.min_samples_leaf, self.bootstrap
        )
    }
}

impl JsonIO for ForestParams {}

/// `num` evenly spaced integers from `start` to `stop` inclusive, truncated.
pub fn int_linspace(start: usize, stop: usize, num: usize) -> Vec<usize> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop as f64 - start as f64) / (num - 1) as f64;
            (0..num).map(|i| (start as f64 + step * i as f64) as usize).collect()
        }
    }
}

/// Discrete candidate values for each hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDistributions {
    pub n_estimators: Vec<usize>,
    pub max_features: Vec<MaxFeatures>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
    pub bootstrap: Vec<bool>,
}

impl Default for ParamDistributions {
    fn default() -> Self {
        let mut max_features = vec![MaxFeatures::Sqrt, MaxFeatures::Log2];
        max_features.extend((1..=10).map(|i| MaxFeatures::Fraction(i as f64 / 10.0)));
        ParamDistributions {
            n_estimators: int_linspace(100, 3000, 30),
            max_features,
            max_depth: int_linspace(10, 300, 30).into_iter().map(Some).collect(),
            min_samples_split: vec![2, 5, 10, 15, 20, 30, 40, 50],
            min_samples_leaf: vec![1, 2, 4, 6, 8, 10, 20, 30],
            bootstrap: vec![true, false],
        }
    }
}

impl ParamDistributions {
    fn sizes(&self) -> [usize; 6] {
        [
            self.n_estimators.len(),
            self.max_features.len(),
            self.max_depth.len(),
            self.min_samples_split.len(),
            self.min_samples_leaf.len(),
            self.bootstrap.len(),
        ]
    }

    /// Number of combinations in the full grid. Errors when it does not fit in a `usize`.
    pub fn grid_size(&self) -> Result<usize, PcnError> {
        self.sizes().iter().try_fold(1usize, |acc, s| acc.checked_mul(*s)).ok_or_else(|| {
            PcnError::InvalidParameter(
                "distributions".to_string(),
                format!("a grid of at most {} combinations", usize::MAX),
                format!("candidate lists of sizes {:?}", self.sizes()),
            )
        })
    }

    /// Decode a grid index into a configuration. The last hyperparameter varies fastest.
    pub fn candidate(&self, index: usize) -> Option<ForestParams> {
        if self.grid_size().map_or(true, |size| index >= size) {
            return None;
        }
        let sizes = self.sizes();
        let mut pos = [0usize; 6];
        let mut rest = index;
        for (p, s) in pos.iter_mut().zip(sizes.iter()).rev() {
            *p = rest % s;
            rest /= s;
        }
        Some(ForestParams {
            n_estimators: self.n_estimators[pos[0]],
            max_features: self.max_features[pos[1]],
            max_depth: self.max_depth[pos[2]],
            min_samples_split: self.min_samples_split[pos[3]],
            min_samples_leaf: self.min_samples_leaf[pos[4]],
            bootstrap: self.bootstrap[pos[5]],
        })
    }

    /// Every configuration of the grid, in grid order.
    pub fn grid(&self) -> Result<Vec<ForestParams>, PcnError> {
        Ok((0..self.grid_size()?).filter_map(|i| self.candidate(i)).collect())
    }

    pub fn validate(&self) -> Result<(), PcnError> {
        let names = [
            "distributions.n_estimators",
            "distributions.max_features",
            "distributions.max_depth",
            "distributions.min_samples_split",
            "distributions.min_samples_leaf",
            "distributions.bootstrap",
        ];
        for (name, size) in names.iter().zip(self.sizes()) {
            validate_min_usize(size, 1, name)?;
        }
        for n in self.n_estimators.iter() {
            validate_min_usize(*n, 1, "distributions.n_estimators")?;
        }
        for m in self.max_features.iter() {
            if let MaxFeatures::Fraction(f) = m {
                validate_float_parameter(*f, f64::MIN_POSITIVE, 1.0, "distributions.max_features")?;
            }
        }
        for d in self.max_depth.iter().flatten() {
            validate_min_usize(*d, 1, "distributions.max_depth")?;
        }
        for s in self.min_samples_split.iter() {
            validate_min_usize(*s, 2, "distributions.min_samples_split")?;
        }
        for l in self.min_samples_leaf.iter() {
            validate_min_usize(*l, 1, "distributions.min_samples_leaf")?;
        }
        self.grid_size()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.n_features(10), 3);
        assert_eq!(MaxFeatures::Log2.n_features(10), 3);
        assert_eq!(MaxFeatures::Fraction(0.1).n_features(5), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).n_features(10), 5);
        assert_eq!(MaxFeatures::All.n_features(7), 7);
        assert_eq!(MaxFeatures::Log2.n_features(1), 1);
    }

    #[test]
    fn test_max_features_parse() {
        assert_eq!("sqrt".parse::<MaxFeatures>().unwrap(), MaxFeatures::Sqrt);
        assert_eq!("0.3".parse::<MaxFeatures>().unwrap(), MaxFeatures::Fraction(0.3));
        assert!("1.5".parse::<MaxFeatures>().is_err());
        assert!("cbrt".parse::<MaxFeatures>().is_err());
    }

    #[test]
    fn test_default_distributions() {
        let d = ParamDistributions::default();
        assert_eq!(d.n_estimators.len(), 30);
        assert_eq!(d.n_estimators[0], 100);
        assert_eq!(d.n_estimators[29], 3000);
        assert_eq!(d.max_depth[1], Some(20));
        assert_eq!(d.max_features.len(), 12);
        assert_eq!(d.grid_size().unwrap(), 30 * 12 * 30 * 8 * 8 * 2);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_candidate_decoding() {
        let d = ParamDistributions {
            n_estimators: vec![10, 20],
            max_features: vec![MaxFeatures::All],
            max_depth: vec![None, Some(3)],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
            bootstrap: vec![true, false],
        };
        assert_eq!(d.grid_size().unwrap(), 8);
        let grid = d.grid().unwrap();
        assert_eq!(grid.len(), 8);
        assert_eq!(grid[0].n_estimators, 10);
        assert!(grid[0].bootstrap);
        assert!(!grid[1].bootstrap);
        assert_eq!(grid[2].max_depth, Some(3));
        assert_eq!(grid[7].n_estimators, 20);
        assert!(d.candidate(8).is_none());
    }

    #[test]
    fn test_grid_size_overflow() {
        let d = ParamDistributions {
            n_estimators: vec![10; 1 << 16],
            max_features: vec![MaxFeatures::All; 1 << 16],
            max_depth: vec![None; 1 << 16],
            min_samples_split: vec![2; 1 << 16],
            min_samples_leaf: vec![1; 2],
            bootstrap: vec![true],
        };
        assert!(matches!(d.grid_size().unwrap_err(), PcnError::InvalidParameter(..)));
        assert!(d.validate().is_err());
        assert!(d.candidate(0).is_none());
    }

    #[test]
    fn test_params_validate() {
        assert!(ForestParams::default().validate().is_ok());
        assert!(ForestParams::default().set_min_samples_split(1).validate().is_err());
        assert!(ForestParams::default()
            .set_max_features(MaxFeatures::Fraction(0.0))
            .validate()
            .is_err());
        assert!(ForestParams::default().set_n_estimators(0).validate().is_err());
    }

    #[test]
    fn test_params_json() {
        let p = ForestParams::default()
            .set_max_features(MaxFeatures::Fraction(0.3))
            .set_max_depth(Some(20));
        let loaded = ForestParams::from_json(&p.json_dump().unwrap()).unwrap();
        assert_eq!(p, loaded);
    }
}
