//! Report
//!
//! Final model at the winning subset size: held out metrics, the features it
//! kept named back through the fitted preprocessor, ranked importances, and the
//! data behind the predicted vs actual and top importance plots.
use crate::config::JsonIO;
use crate::constants::TOP_IMPORTANCES;
use crate::errors::PcnError;
use crate::metric::{Metric, RegressionMetrics};
use crate::params::ForestParams;
use crate::preprocessing::{FeatureKind, FittedPreprocessor};
use crate::search::{SearchResult, SearchWarning};
use crate::selection::{fit_subset, SweepData, SweepResult};
use crate::utils::fmt_vec_output;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A design matrix column kept at the winning subset size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFeature {
    pub column: usize,
    pub output_name: String,
    /// Input feature the column was produced from.
    pub feature: String,
    pub kind: FeatureKind,
    /// `<feature>_<category>` labels the column stands for, empty for numeric features.
    pub category_labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

/// Pair names with importances, sorted descending. Ties keep column order.
pub fn rank_importances(names: &[String], importances: &[f64]) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(name, &importance)| FeatureImportance {
            name: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub actual: f64,
    pub predicted: f64,
}

/// Bar of the top importance plot, `colour` is the importance min-max scaled over the bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceBar {
    pub name: String,
    pub importance: f64,
    pub colour: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    pub scatter: Vec<ScatterPoint>,
    /// Both ends of the identity line, `[min(y), max(y)]`.
    pub identity_line: [f64; 2],
    pub top_importances: Vec<ImportanceBar>,
}

impl PlotData {
    pub fn new(actual: &[f64], predicted: &[f64], ranked: &[FeatureImportance]) -> Self {
        let scatter = actual
            .iter()
            .zip(predicted)
            .map(|(&actual, &predicted)| ScatterPoint { actual, predicted })
            .collect();
        let min_y = actual.iter().copied().fold(f64::INFINITY, f64::min);
        let max_y = actual.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let top = &ranked[..ranked.len().min(TOP_IMPORTANCES)];
        let lo = top.iter().map(|f| f.importance).fold(f64::INFINITY, f64::min);
        let hi = top.iter().map(|f| f.importance).fold(f64::NEG_INFINITY, f64::max);
        let top_importances = top
            .iter()
            .map(|f| ImportanceBar {
                name: f.name.clone(),
                importance: f.importance,
                colour: if hi > lo { (f.importance - lo) / (hi - lo) } else { 0.0 },
            })
            .collect();
        PlotData {
            scatter,
            identity_line: [min_y, max_y],
            top_importances,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcnReport {
    pub n_train: usize,
    pub n_test: usize,
    pub scoring: Metric,
    pub tuned_params: ForestParams,
    pub cv_score: f64,
    pub baseline_score: f64,
    pub warning: Option<SearchWarning>,
    pub best_k: usize,
    /// Held out metrics of the final model.
    pub metrics: RegressionMetrics,
    pub selected: Vec<SelectedFeature>,
    pub importances: Vec<FeatureImportance>,
    pub sweep: SweepResult,
    pub plot: PlotData,
}

impl PcnReport {
    /// Refit the tuned forest on the columns kept at the winning subset size,
    /// and describe the result.
    ///
    /// * `search` - Result of the hyperparameter search.
    /// * `preprocessor` - Preprocessor that produced the sweep matrices.
    /// * `sweep` - Result of the feature selection sweep.
    /// * `data` - Matrices the sweep ran on.
    /// * `seed` - Forest seed used by the sweep.
    pub fn build(
        search: &SearchResult,
        preprocessor: &FittedPreprocessor,
        sweep: SweepResult,
        data: &SweepData,
        seed: u64,
    ) -> Result<Self, PcnError> {
        let best = sweep
            .best()
            .ok_or(PcnError::NoFeasibleSubset(sweep.failures.len()))?
            .clone();
        let forest = fit_subset(data.x_train, data.y_train, &best.selected_columns, search.best_params, seed)?;
        let x_test = data.x_test.select_columns(&best.selected_columns);
        let predicted = forest.predict(&x_test.view(), false)?;
        let metrics = RegressionMetrics::evaluate(data.y_test, &predicted)?;

        let selected = best
            .selected_columns
            .iter()
            .filter_map(|&c| preprocessor.describe_output(c))
            .map(|o| SelectedFeature {
                column: o.index,
                output_name: o.name,
                feature: o.feature.name,
                kind: o.feature.kind,
                category_labels: o.category_labels,
            })
            .collect();
        let importances = rank_importances(&best.selected_features, &forest.feature_importances());
        let plot = PlotData::new(data.y_test, &predicted, &importances);

        Ok(PcnReport {
            n_train: data.y_train.len(),
            n_test: data.y_test.len(),
            scoring: search.scoring,
            tuned_params: search.best_params,
            cv_score: search.best_score,
            baseline_score: search.baseline_score,
            warning: search.warning,
            best_k: best.k,
            metrics,
            selected,
            importances,
            sweep,
            plot,
        })
    }
}

impl JsonIO for PcnReport {}

impl fmt::Display for PcnReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Rows: {} train, {} test", self.n_train, self.n_test)?;
        writeln!(f, "Tuned parameters: {}", self.tuned_params)?;
        writeln!(
            f,
            "Cross validation {:?}: {:.4} (mean predictor {:.4})",
            self.scoring, self.cv_score, self.baseline_score
        )?;
        if let Some(w) = &self.warning {
            writeln!(f, "Warning: {}", w)?;
        }
        writeln!(f, "Subset sizes evaluated: {}", self.sweep.results.len())?;
        for r in self.sweep.results.iter() {
            writeln!(
                f,
                "  k={:<3} MAE={:.4} RMSE={:.4} R2={:.4}",
                r.k, r.metrics.mae, r.metrics.rmse, r.metrics.r2
            )?;
        }
        writeln!(f, "Best subset size: {}", self.best_k)?;
        writeln!(
            f,
            "Test metrics: MAE={:.4} MSE={:.4} RMSE={:.4} R2={:.4}",
            self.metrics.mae, self.metrics.mse, self.metrics.rmse, self.metrics.r2
        )?;
        writeln!(f, "Selected features:")?;
        for s in self.selected.iter() {
            if s.category_labels.is_empty() {
                writeln!(f, "  {}", s.output_name)?;
            } else {
                writeln!(f, "  {} [{}]", s.output_name, s.category_labels.join(", "))?;
            }
        }
        writeln!(f, "Importances:")?;
        for i in self.importances.iter() {
            writeln!(f, "  {:<30} {}", i.name, fmt_vec_output(&[i.importance]))?;
        }
        Ok(())
    }
}
