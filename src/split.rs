//! Split
//!
//! Seeded train/test partition of the table rows, and k-fold partitions of the
//! training rows used to score candidates.
use crate::errors::PcnError;
use crate::table::SampleTable;
use crate::utils::{validate_min_usize, validate_open_fraction};
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Row indices of the train and test partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplit {
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
}

impl DataSplit {
    /// Materialize the two partitions of a table.
    pub fn apply(&self, table: &SampleTable) -> (SampleTable, SampleTable) {
        (table.take_rows(&self.train_rows), table.take_rows(&self.test_rows))
    }
}

/// Shuffle the row indices and hold out `ceil(test_fraction * n_rows)` of them.
///
/// * `n_rows` - Number of rows in the table.
/// * `test_fraction` - Share of rows to hold out, strictly between 0 and 1.
/// * `seed` - Seed of the shuffle, the same seed always gives the same split.
pub fn train_test_split(n_rows: usize, test_fraction: f64, seed: u64) -> Result<DataSplit, PcnError> {
    validate_open_fraction(test_fraction, "test_fraction")?;
    let n_test = (test_fraction * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(PcnError::InvalidParameter(
            "test_fraction".to_string(),
            format!("a fraction leaving both partitions of {} rows non empty", n_rows),
            test_fraction.to_string(),
        ));
    }

    let mut rows: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    rows.shuffle(&mut rng);
    let train_rows = rows.split_off(n_test);
    info!("Split {} rows into {} train and {} test rows.", n_rows, train_rows.len(), rows.len());
    Ok(DataSplit {
        train_rows,
        test_rows: rows,
    })
}

/// One fold of a k-fold partition, positions are relative to the partitioned rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Contiguous, unshuffled k-fold partition of `0..n_rows`. The first `n_rows % k`
/// folds hold one extra row.
pub fn kfold(n_rows: usize, k: usize) -> Result<Vec<Fold>, PcnError> {
    validate_min_usize(k, 2, "cv_folds")?;
    if k > n_rows {
        return Err(PcnError::InvalidParameter(
            "cv_folds".to_string(),
            format!("at most the {} training rows", n_rows),
            k.to_string(),
        ));
    }
    let base_size = n_rows / k;
    let remainder = n_rows % k;

    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base_size + usize::from(i < remainder);
        bounds.push(start..start + size);
        start += size;
    }

    Ok(bounds
        .iter()
        .map(|b| Fold {
            train: (0..b.start).chain(b.end..n_rows).collect(),
            validation: b.clone().collect(),
        })
        .collect())
}
