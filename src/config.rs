//! Pipeline Configuration
//!
//! Configuration of a full run, and the JSON persistence shared by every
//! serializable record of the crate.
use crate::constants::{
    DEFAULT_CV_FOLDS, DEFAULT_ELIMINATION_STEP, DEFAULT_MAX_DEPTH_DELTA, DEFAULT_MAX_FEATURES_DELTA,
    DEFAULT_N_ESTIMATORS_DELTA, DEFAULT_RANDOM_SAMPLES, DEFAULT_SEED, DEFAULT_TEST_FRACTION,
};
use crate::errors::PcnError;
use crate::metric::Metric;
use crate::params::ParamDistributions;
use crate::preprocessing::CategoricalEncoding;
use crate::utils::{validate_float_parameter, validate_min_usize, validate_open_fraction};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// JSON persistence.
pub trait JsonIO: Serialize + DeserializeOwned + Sized {
    /// Save as a json object to a file.
    ///
    /// * `path` - Path to save to.
    fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), PcnError> {
        fs::write(path, self.json_dump()?).map_err(|e| PcnError::UnableToWrite(e.to_string()))
    }

    /// Dump as a json object.
    fn json_dump(&self) -> Result<String, PcnError> {
        serde_json::to_string(self).map_err(|e| PcnError::UnableToWrite(e.to_string()))
    }

    /// Load from a json string.
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, PcnError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| PcnError::UnableToRead(e.to_string()))
    }

    /// Load from a path to a json object.
    ///
    /// * `path` - Path to load from.
    fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, PcnError> {
        let json_str = fs::read_to_string(path).map_err(|e| PcnError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

fn default_refinement_enabled() -> bool {
    true
}
fn default_n_estimators_delta() -> usize {
    DEFAULT_N_ESTIMATORS_DELTA
}
fn default_max_depth_delta() -> usize {
    DEFAULT_MAX_DEPTH_DELTA
}
fn default_max_features_delta() -> f64 {
    DEFAULT_MAX_FEATURES_DELTA
}

/// Width of the grid built around the randomized winner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Whether the refinement stage runs at all.
    #[serde(default = "default_refinement_enabled")]
    pub enabled: bool,
    #[serde(default = "default_n_estimators_delta")]
    pub n_estimators_delta: usize,
    #[serde(default = "default_max_depth_delta")]
    pub max_depth_delta: usize,
    #[serde(default = "default_max_features_delta")]
    pub max_features_delta: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        RefinementConfig {
            enabled: true,
            n_estimators_delta: DEFAULT_N_ESTIMATORS_DELTA,
            max_depth_delta: DEFAULT_MAX_DEPTH_DELTA,
            max_features_delta: DEFAULT_MAX_FEATURES_DELTA,
        }
    }
}

fn default_cv_folds() -> usize {
    DEFAULT_CV_FOLDS
}
fn default_random_samples() -> usize {
    DEFAULT_RANDOM_SAMPLES
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_elimination_step() -> usize {
    DEFAULT_ELIMINATION_STEP
}
fn default_test_fraction() -> f64 {
    DEFAULT_TEST_FRACTION
}

/// Configuration of a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of cross validation folds scoring each candidate.
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Number of configurations sampled by the randomized stage.
    #[serde(default = "default_random_samples")]
    pub random_samples: usize,
    /// Seed of the split, the candidate sampling and every forest.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of columns dropped per elimination round.
    #[serde(default = "default_elimination_step")]
    pub elimination_step: usize,
    /// Share of rows held out for testing.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Number of threads for parallel tasks, all cores when `None`.
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Metric scoring the cross validation folds.
    #[serde(default)]
    pub scoring: Metric,
    /// Encoding of the categorical columns.
    #[serde(default)]
    pub encoding: CategoricalEncoding,
    /// Domains of the randomized stage.
    #[serde(default)]
    pub distributions: ParamDistributions,
    #[serde(default)]
    pub refinement: RefinementConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            cv_folds: DEFAULT_CV_FOLDS,
            random_samples: DEFAULT_RANDOM_SAMPLES,
            seed: DEFAULT_SEED,
            elimination_step: DEFAULT_ELIMINATION_STEP,
            test_fraction: DEFAULT_TEST_FRACTION,
            num_threads: None,
            scoring: Metric::default(),
            encoding: CategoricalEncoding::default(),
            distributions: ParamDistributions::default(),
            refinement: RefinementConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject out of range values before any work is done.
    pub fn validate(&self) -> Result<(), PcnError> {
        validate_min_usize(self.cv_folds, 2, "cv_folds")?;
        validate_min_usize(self.random_samples, 1, "random_samples")?;
        validate_min_usize(self.elimination_step, 1, "elimination_step")?;
        validate_open_fraction(self.test_fraction, "test_fraction")?;
        if let Some(n) = self.num_threads {
            validate_min_usize(n, 1, "num_threads")?;
        }
        validate_float_parameter(
            self.refinement.max_features_delta,
            0.0,
            1.0,
            "refinement.max_features_delta",
        )?;
        self.distributions.validate()
    }

    /// Set the number of cross validation folds.
    /// * `cv_folds` - At least 2.
    pub fn set_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    /// Set the number of configurations sampled by the randomized stage.
    pub fn set_random_samples(mut self, random_samples: usize) -> Self {
        self.random_samples = random_samples;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of columns dropped per elimination round.
    pub fn set_elimination_step(mut self, elimination_step: usize) -> Self {
        self.elimination_step = elimination_step;
        self
    }

    /// Set the share of rows held out for testing.
    /// * `test_fraction` - Strictly between 0 and 1.
    pub fn set_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    /// Set the number of threads.
    /// * `num_threads` - Set the number of threads to be used, all cores when `None`.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn set_scoring(mut self, scoring: Metric) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn set_encoding(mut self, encoding: CategoricalEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn set_distributions(mut self, distributions: ParamDistributions) -> Self {
        self.distributions = distributions;
        self
    }

    pub fn set_refinement(mut self, refinement: RefinementConfig) -> Self {
        self.refinement = refinement;
        self
    }

    /// Build the rayon pool every stage runs in.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool, PcnError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.num_threads {
            builder = builder.num_threads(n);
        }
        builder.build().map_err(|e| PcnError::ThreadPool(e.to_string()))
    }
}

impl JsonIO for PipelineConfig {}
