use crate::errors::PcnError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type MetricFn = fn(&[f64], &[f64]) -> f64;

/// Compare to metric values, determining if b is better.
/// If one of them is NaN favor the non NaN value.
/// If both are NaN, consider the first value to be better.
pub fn is_comparison_better(value: f64, comparison: f64, maximize: bool) -> bool {
    match (value.is_nan(), comparison.is_nan()) {
        // Both nan, comparison is not better,
        // Or comparison is nan, also not better
        (true, true) | (false, true) => false,
        // comparison is not Nan, it's better
        (true, false) => true,
        // Perform numerical comparison.
        (false, false) => {
            if maximize {
                value < comparison
            } else {
                value > comparison
            }
        }
    }
}

/// Metric used to score candidates during cross validation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    #[default]
    MeanAbsoluteError,
    MeanSquaredError,
    RootMeanSquaredError,
    R2,
}

impl FromStr for Metric {
    type Err = PcnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MeanAbsoluteError" => Ok(Metric::MeanAbsoluteError),
            "MeanSquaredError" => Ok(Metric::MeanSquaredError),
            "RootMeanSquaredError" => Ok(Metric::RootMeanSquaredError),
            "R2" => Ok(Metric::R2),

            _ => Err(PcnError::ParseString(
                s.to_string(),
                "Metric".to_string(),
                items_to_strings(vec![
                    "MeanAbsoluteError",
                    "MeanSquaredError",
                    "RootMeanSquaredError",
                    "R2",
                ]),
            )),
        }
    }
}

pub fn metric_callables(metric_type: &Metric) -> (MetricFn, bool) {
    match metric_type {
        Metric::MeanAbsoluteError => (
            MeanAbsoluteErrorMetric::calculate_metric,
            MeanAbsoluteErrorMetric::maximize(),
        ),
        Metric::MeanSquaredError => (
            MeanSquaredErrorMetric::calculate_metric,
            MeanSquaredErrorMetric::maximize(),
        ),
        Metric::RootMeanSquaredError => (
            RootMeanSquaredErrorMetric::calculate_metric,
            RootMeanSquaredErrorMetric::maximize(),
        ),
        Metric::R2 => (R2Metric::calculate_metric, R2Metric::maximize()),
    }
}

pub trait EvaluationMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64]) -> f64;
    fn maximize() -> bool;
}

pub struct MeanAbsoluteErrorMetric {}
impl EvaluationMetric for MeanAbsoluteErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64]) -> f64 {
        mean_absolute_error(y, yhat)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct MeanSquaredErrorMetric {}
impl EvaluationMetric for MeanSquaredErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64]) -> f64 {
        mean_squared_error(y, yhat)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct RootMeanSquaredErrorMetric {}
impl EvaluationMetric for RootMeanSquaredErrorMetric {
    fn calculate_metric(y: &[f64], yhat: &[f64]) -> f64 {
        root_mean_squared_error(y, yhat)
    }
    fn maximize() -> bool {
        false
    }
}

pub struct R2Metric {}
impl EvaluationMetric for R2Metric {
    fn calculate_metric(y: &[f64], yhat: &[f64]) -> f64 {
        r2_score(y, yhat)
    }
    fn maximize() -> bool {
        true
    }
}

pub fn mean_absolute_error(y: &[f64], yhat: &[f64]) -> f64 {
    let res = y.iter().zip(yhat).map(|(y_, yhat_)| (y_ - yhat_).abs()).sum::<f64>();
    res / y.len() as f64
}

pub fn mean_squared_error(y: &[f64], yhat: &[f64]) -> f64 {
    let res = y.iter().zip(yhat).map(|(y_, yhat_)| (y_ - yhat_).powi(2)).sum::<f64>();
    res / y.len() as f64
}

pub fn root_mean_squared_error(y: &[f64], yhat: &[f64]) -> f64 {
    mean_squared_error(y, yhat).sqrt()
}

/// Coefficient of determination. Not clamped, a model worse than the mean
/// gives a negative value. A constant target scores 1.0 when predicted
/// exactly, and 0.0 otherwise.
pub fn r2_score(y: &[f64], yhat: &[f64]) -> f64 {
    let y_mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_res = y.iter().zip(yhat).map(|(y_, yhat_)| (y_ - yhat_).powi(2)).sum::<f64>();
    let ss_tot = y.iter().map(|y_| (y_ - y_mean).powi(2)).sum::<f64>();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Held out error metrics of a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// Evaluate predictions against the targets they were produced for.
    pub fn evaluate(y: &[f64], yhat: &[f64]) -> Result<Self, PcnError> {
        if y.len() != yhat.len() {
            return Err(PcnError::ShapeMismatch(format!(
                "{} targets scored against {} predictions",
                y.len(),
                yhat.len()
            )));
        }
        if y.is_empty() {
            return Err(PcnError::EmptyTable("no rows to score".to_string()));
        }
        let mse = mean_squared_error(y, yhat);
        Ok(RegressionMetrics {
            mae: mean_absolute_error(y, yhat),
            mse,
            rmse: mse.sqrt(),
            r2: r2_score(y, yhat),
        })
    }
}
