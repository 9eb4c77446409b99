//! Forest Pipeline
//!
//! A preprocessor and a forest fitted together on the same rows, used to
//! score candidates and to predict raw sample tables.
use crate::config::JsonIO;
use crate::errors::PcnError;
use crate::forest::RandomForestRegressor;
use crate::metric::{metric_callables, Metric};
use crate::params::ForestParams;
use crate::preprocessing::{CategoricalEncoding, FittedPreprocessor, Preprocessor};
use crate::table::SampleTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPipeline {
    pub preprocessor: FittedPreprocessor,
    pub forest: RandomForestRegressor,
}

impl ForestPipeline {
    /// Fit the preprocessor and then the forest on the rows of `table`.
    ///
    /// * `table` - Training rows.
    /// * `encoding` - Encoding of the categorical columns.
    /// * `params` - Forest hyperparameters.
    /// * `seed` - Forest seed.
    pub fn fit(
        table: &SampleTable,
        encoding: CategoricalEncoding,
        params: ForestParams,
        seed: u64,
    ) -> Result<Self, PcnError> {
        let preprocessor = Preprocessor::new(encoding).fit(table)?;
        let x = preprocessor.transform(table)?;
        let mut forest = RandomForestRegressor::new(params, seed);
        forest.fit(&x.view(), table.target_values())?;
        Ok(ForestPipeline { preprocessor, forest })
    }

    /// Predict the rows of a table with the fitted schema.
    pub fn predict(&self, table: &SampleTable) -> Result<Vec<f64>, PcnError> {
        let x = self.preprocessor.transform(table)?;
        self.forest.predict(&x.view(), false)
    }

    /// Score the predictions of `table` against its own target.
    pub fn score(&self, table: &SampleTable, metric: &Metric) -> Result<f64, PcnError> {
        let (metric_fn, _) = metric_callables(metric);
        let yhat = self.predict(table)?;
        Ok(metric_fn(table.target_values(), &yhat))
    }
}

impl JsonIO for ForestPipeline {}
