pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_CV_FOLDS: usize = 5;
pub const DEFAULT_RANDOM_SAMPLES: usize = 500;
pub const DEFAULT_ELIMINATION_STEP: usize = 1;
pub const DEFAULT_N_ESTIMATORS_DELTA: usize = 100;
pub const DEFAULT_MAX_DEPTH_DELTA: usize = 10;
pub const DEFAULT_MAX_FEATURES_DELTA: f64 = 0.1;
/// Code assigned by the ordinal encoder to categories never seen at fit time.
pub const UNKNOWN_CATEGORY_CODE: f64 = -1.0;
pub const TOP_IMPORTANCES: usize = 10;
/// Multiplier used to derive per-tree seeds from the forest seed.
pub const TREE_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
