//! Feature Selection
//!
//! Recursive feature elimination against the tuned forest, swept over every
//! subset size `k = 1..=F` of the design matrix columns. Each `k` is evaluated
//! independently on the held out rows, and the size with the lowest mean absolute
//! error wins.
use crate::config::JsonIO;
use crate::data::DesignMatrix;
use crate::errors::PcnError;
use crate::forest::RandomForestRegressor;
use crate::metric::RegressionMetrics;
use crate::params::ForestParams;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::Path;

/// Outcome of eliminating columns down to `k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elimination {
    pub k: usize,
    /// Surviving columns, ascending.
    pub selected: Vec<usize>,
    /// One rank per column, 1 for survivors, larger for columns eliminated earlier.
    pub ranking: Vec<usize>,
}

/// Fit the forest on a subset of the columns of `x`.
pub fn fit_subset(
    x: &DesignMatrix,
    y: &[f64],
    columns: &[usize],
    params: ForestParams,
    seed: u64,
) -> Result<RandomForestRegressor, PcnError> {
    let sub = x.select_columns(columns);
    let mut forest = RandomForestRegressor::new(params, seed);
    forest.fit(&sub.view(), y)?;
    Ok(forest)
}

/// Repeatedly fit the forest and drop the `min(step, n_current - k)` least important
/// columns until `k` remain. Ties drop the lowest column index first.
pub fn recursive_feature_elimination(
    x: &DesignMatrix,
    y: &[f64],
    params: ForestParams,
    seed: u64,
    k: usize,
    step: usize,
) -> Result<Elimination, PcnError> {
    if k == 0 || k > x.cols {
        return Err(PcnError::InvalidParameter(
            "k".to_string(),
            format!("a subset size between 1 and {}", x.cols),
            k.to_string(),
        ));
    }
    if step == 0 {
        return Err(PcnError::InvalidParameter(
            "elimination_step".to_string(),
            "at least 1".to_string(),
            "0".to_string(),
        ));
    }

    let mut active: Vec<usize> = (0..x.cols).collect();
    let mut eliminated_in = vec![None; x.cols];
    let mut rounds = 0;
    while active.len() > k {
        let forest = fit_subset(x, y, &active, params, seed)?;
        let importances = forest.feature_importances();
        let mut order: Vec<usize> = (0..active.len()).collect();
        order.sort_by(|a, b| importances[*a].total_cmp(&importances[*b]).then(active[*a].cmp(&active[*b])));
        let n_drop = step.min(active.len() - k);
        let mut drop: Vec<usize> = order[..n_drop].to_vec();
        for &pos in drop.iter() {
            eliminated_in[active[pos]] = Some(rounds);
        }
        drop.sort_unstable();
        for pos in drop.into_iter().rev() {
            active.remove(pos);
        }
        rounds += 1;
    }

    let ranking = eliminated_in
        .iter()
        .map(|r| match r {
            Some(round) => 1 + rounds - round,
            None => 1,
        })
        .collect();
    Ok(Elimination {
        k,
        selected: active,
        ranking,
    })
}

/// Held out evaluation of one subset size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetResult {
    pub k: usize,
    pub selected_columns: Vec<usize>,
    pub selected_features: Vec<String>,
    pub ranking: Vec<usize>,
    pub metrics: RegressionMetrics,
}

impl SubsetResult {
    pub fn mae(&self) -> f64 {
        self.metrics.mae
    }
}

/// A subset size that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub k: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    /// Ordered by `k`.
    pub results: Vec<SubsetResult>,
    pub failures: Vec<SweepFailure>,
}

/// Record with the lowest MAE, the smallest `k` on ties. NaN never wins.
pub fn select_best(results: &[SubsetResult]) -> Option<&SubsetResult> {
    let mut best: Option<&SubsetResult> = None;
    for r in results.iter().filter(|r| !r.mae().is_nan()) {
        best = match best {
            Some(b) if r.mae() > b.mae() || (r.mae() == b.mae() && r.k >= b.k) => Some(b),
            _ => Some(r),
        };
    }
    best
}

impl SweepResult {
    pub fn best(&self) -> Option<&SubsetResult> {
        select_best(&self.results)
    }

    /// Write the results as delimited text, one row per `k`.
    ///
    /// * `writer` - Destination.
    /// * `delimiter` - Field delimiter, for example `b','` or `b'\t'`.
    pub fn write_table<W: io::Write>(&self, writer: W, delimiter: u8) -> Result<(), PcnError> {
        let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer);
        wtr.write_record(["k", "MAE", "MSE", "RMSE", "R2", "selected_features"])
            .map_err(|e| PcnError::UnableToWrite(e.to_string()))?;
        for r in self.results.iter() {
            wtr.write_record([
                r.k.to_string(),
                r.metrics.mae.to_string(),
                r.metrics.mse.to_string(),
                r.metrics.rmse.to_string(),
                r.metrics.r2.to_string(),
                r.selected_features.join(";"),
            ])
            .map_err(|e| PcnError::UnableToWrite(e.to_string()))?;
        }
        wtr.flush().map_err(|e| PcnError::UnableToWrite(e.to_string()))
    }

    /// Save the results table to a file.
    pub fn save_table<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<(), PcnError> {
        let file = File::create(path).map_err(|e| PcnError::UnableToWrite(e.to_string()))?;
        self.write_table(file, delimiter)
    }
}

impl JsonIO for SweepResult {}

/// Sweep of recursive feature elimination over every subset size.
#[derive(Debug, Clone, Copy)]
pub struct FeatureSweep {
    pub params: ForestParams,
    pub seed: u64,
    pub step: usize,
}

/// Design matrices and targets of the train and test partitions.
#[derive(Debug, Clone, Copy)]
pub struct SweepData<'a> {
    pub x_train: &'a DesignMatrix,
    pub y_train: &'a [f64],
    pub x_test: &'a DesignMatrix,
    pub y_test: &'a [f64],
    /// Name of each design matrix column.
    pub names: &'a [String],
}

impl FeatureSweep {
    pub fn new(params: ForestParams, seed: u64, step: usize) -> Self {
        FeatureSweep { params, seed, step }
    }

    /// Eliminate down to `k` columns, refit on the survivors and score the test rows.
    pub fn evaluate_k(&self, data: &SweepData, k: usize) -> Result<SubsetResult, PcnError> {
        let elimination = recursive_feature_elimination(data.x_train, data.y_train, self.params, self.seed, k, self.step)?;
        let forest = fit_subset(data.x_train, data.y_train, &elimination.selected, self.params, self.seed)?;
        let x_test = data.x_test.select_columns(&elimination.selected);
        let yhat = forest.predict(&x_test.view(), false)?;
        let metrics = RegressionMetrics::evaluate(data.y_test, &yhat)?;
        Ok(SubsetResult {
            k,
            selected_features: elimination.selected.iter().map(|&c| data.names[c].clone()).collect(),
            selected_columns: elimination.selected,
            ranking: elimination.ranking,
            metrics,
        })
    }

    /// Evaluate every `k` from 1 to the number of columns, in parallel.
    pub fn run(&self, data: &SweepData) -> Result<SweepResult, PcnError> {
        let n_cols = data.x_train.cols;
        if data.x_test.cols != n_cols || data.names.len() != n_cols {
            return Err(PcnError::ShapeMismatch(format!(
                "train has {} columns, test has {} and {} names were given",
                n_cols,
                data.x_test.cols,
                data.names.len()
            )));
        }
        if data.y_train.len() != data.x_train.rows || data.y_test.len() != data.x_test.rows {
            return Err(PcnError::ShapeMismatch(
                "targets do not match the design matrix rows".to_string(),
            ));
        }

        info!("Sweeping subset sizes 1 to {}.", n_cols);
        let outcomes: Vec<(usize, Result<SubsetResult, PcnError>)> = (1..=n_cols)
            .into_par_iter()
            .map(|k| (k, self.evaluate_k(data, k)))
            .collect();

        let mut results = Vec::with_capacity(n_cols);
        let mut failures = Vec::new();
        for (k, outcome) in outcomes {
            match outcome {
                Ok(r) => results.push(r),
                Err(e) if e.is_fit_error() => {
                    warn!("Subset size {} failed: {}", k, e);
                    failures.push(SweepFailure { k, error: e.to_string() });
                }
                Err(e) => return Err(e),
            }
        }
        if results.is_empty() {
            return Err(PcnError::NoFeasibleSubset(failures.len()));
        }
        if let Some(best) = select_best(&results) {
            info!("Best subset size {} with MAE {:.4}.", best.k, best.mae());
        }
        Ok(SweepResult { results, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn record(k: usize, mae: f64) -> SubsetResult {
        SubsetResult {
            k,
            selected_columns: (0..k).collect(),
            selected_features: (0..k).map(|c| format!("f{}", c)).collect(),
            ranking: Vec::new(),
            metrics: RegressionMetrics {
                mae,
                mse: mae * mae,
                rmse: mae,
                r2: 0.0,
            },
        }
    }

    /// Column 0 drives the target, column 1 less so, column 2 is noise.
    fn design(n: usize, seed: u64) -> (DesignMatrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let cols: Vec<Vec<f64>> = (0..3)
            .map(|_| (0..n).map(|_| rng.gen_range(0.0..10.0)).collect())
            .collect();
        let y: Vec<f64> = (0..n).map(|i| 5.0 * cols[0][i] + 2.0 * cols[1][i]).collect();
        (DesignMatrix::from_columns(cols, n), y)
    }

    fn params() -> ForestParams {
        ForestParams::default().set_n_estimators(10)
    }

    #[test]
    fn test_select_best() {
        let results = vec![record(1, 5.0), record(2, 3.0), record(3, 4.0)];
        assert_eq!(select_best(&results).unwrap().k, 2);
    }

    #[test]
    fn test_select_best_ties_and_nan() {
        let results = vec![record(1, 3.0), record(2, 3.0)];
        assert_eq!(select_best(&results).unwrap().k, 1);
        let results = vec![record(2, 3.0), record(1, 3.0)];
        assert_eq!(select_best(&results).unwrap().k, 1);
        let results = vec![record(1, f64::NAN), record(2, 9.0)];
        assert_eq!(select_best(&results).unwrap().k, 2);
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_rfe_keeps_informative_column() {
        let (x, y) = design(80, 3);
        let e = recursive_feature_elimination(&x, &y, params(), 0, 1, 1).unwrap();
        assert_eq!(e.selected, vec![0]);
        assert_eq!(e.ranking[0], 1);
        assert_eq!(e.ranking[2], 3);
        assert_eq!(e.ranking[1], 2);

        let e = recursive_feature_elimination(&x, &y, params(), 0, 3, 1).unwrap();
        assert_eq!(e.selected, vec![0, 1, 2]);
        assert_eq!(e.ranking, vec![1, 1, 1]);
    }

    #[test]
    fn test_rfe_ranking_with_step() {
        // Two noise columns next to the columns of `design`.
        let n = 80;
        let (x, y) = design(n, 3);
        let mut rng = StdRng::seed_from_u64(11);
        let mut data = x.data.clone();
        data.extend((0..n).map(|_| rng.gen_range(0.0..10.0)));
        let x = DesignMatrix::new(data, n, 4);

        // Round one drops both noise columns, round two drops column 1.
        let e = recursive_feature_elimination(&x, &y, params(), 0, 1, 2).unwrap();
        assert_eq!(e.selected, vec![0]);
        assert_eq!(e.ranking, vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_rfe_step_never_overshoots() {
        let (x, y) = design(40, 3);
        let e = recursive_feature_elimination(&x, &y, params(), 0, 2, 5).unwrap();
        assert_eq!(e.selected.len(), 2);
        assert!(recursive_feature_elimination(&x, &y, params(), 0, 0, 1).is_err());
        assert!(recursive_feature_elimination(&x, &y, params(), 0, 4, 1).is_err());
    }

    #[test]
    fn test_sweep() {
        let (x_train, y_train) = design(80, 3);
        let (x_test, y_test) = design(20, 4);
        let names: Vec<String> = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let data = SweepData {
            x_train: &x_train,
            y_train: &y_train,
            x_test: &x_test,
            y_test: &y_test,
            names: &names,
        };
        let sweep = FeatureSweep::new(params(), 42, 1);
        let result = sweep.run(&data).unwrap();
        assert_eq!(result.results.len(), 3);
        assert!(result.failures.is_empty());
        let ks: Vec<usize> = result.results.iter().map(|r| r.k).collect();
        assert_eq!(ks, vec![1, 2, 3]);
        assert_eq!(result.results[0].selected_features, vec!["a".to_string()]);
        assert_eq!(result, sweep.run(&data).unwrap());

        let best = result.best().unwrap();
        let refit = fit_subset(&x_train, &y_train, &best.selected_columns, params(), 42).unwrap();
        let yhat = refit
            .predict(&x_test.select_columns(&best.selected_columns).view(), false)
            .unwrap();
        assert_eq!(RegressionMetrics::evaluate(&y_test, &yhat).unwrap(), best.metrics);
    }

    #[test]
    fn test_sweep_records_failures() {
        // Column 1 is constant and never splits, so it is eliminated first.
        let n = 30;
        let x0: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y: Vec<f64> = x0.iter().map(|v| v * 2.0).collect();
        let x_train = DesignMatrix::from_columns(vec![x0.clone(), vec![1.0; n]], n);
        let x_test = x_train.clone();
        let names = vec!["x".to_string(), "constant".to_string()];
        let data = SweepData {
            x_train: &x_train,
            y_train: &y,
            x_test: &x_test,
            y_test: &y,
            names: &names,
        };
        let result = FeatureSweep::new(params(), 0, 1).run(&data).unwrap();
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].selected_features, vec!["x".to_string()]);

        // A forest on a constant column alone can not be fitted.
        let constant = DesignMatrix::from_columns(vec![vec![1.0; n]], n);
        let names = vec!["constant".to_string()];
        let data = SweepData {
            x_train: &constant,
            y_train: &y,
            x_test: &constant,
            y_test: &y,
            names: &names,
        };
        let err = FeatureSweep::new(params(), 0, 1).run(&data).unwrap_err();
        assert!(matches!(err, PcnError::NoFeasibleSubset(1)));
    }

    #[test]
    fn test_write_table() {
        let sweep = SweepResult {
            results: vec![record(1, 2.0), record(2, 1.0)],
            failures: Vec::new(),
        };
        let mut buf = Vec::new();
        sweep.write_table(&mut buf, b'\t').unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "k\tMAE\tMSE\tRMSE\tR2\tselected_features");
        assert_eq!(lines[2], "2\t1\t1\t1\t0\tf0;f1");
        assert_eq!(sweep.best().unwrap().k, 2);
    }
}
