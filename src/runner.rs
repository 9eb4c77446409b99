//! Pipeline Runner
//!
//! Runs every stage in order: split the rows, tune the forest, sweep the subset
//! sizes and report on the winner. Each stage reads the records of the previous
//! ones and returns a new record.
use crate::config::PipelineConfig;
use crate::errors::PcnError;
use crate::preprocessing::Preprocessor;
use crate::report::PcnReport;
use crate::search::HyperparameterSearch;
use crate::selection::{FeatureSweep, SweepData};
use crate::split::train_test_split;
use crate::table::SampleTable;
use log::info;
use std::time::Instant;

pub struct PcnPipeline {
    pub config: PipelineConfig,
}

impl PcnPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        PcnPipeline { config }
    }

    /// Run the full pipeline on a table, inside a rayon pool of `num_threads` threads.
    pub fn run(&self, table: &SampleTable) -> Result<PcnReport, PcnError> {
        self.config.validate()?;
        let pool = self.config.thread_pool()?;
        pool.install(|| self.run_stages(table))
    }

    fn run_stages(&self, table: &SampleTable) -> Result<PcnReport, PcnError> {
        let start = Instant::now();
        let config = &self.config;

        let split = train_test_split(table.n_rows(), config.test_fraction, config.seed)?;
        let (train, test) = split.apply(table);

        let search = HyperparameterSearch::from_config(config).run(&train)?;

        let preprocessor = Preprocessor::new(config.encoding).fit(&train)?;
        let x_train = preprocessor.transform(&train)?;
        let x_test = preprocessor.transform(&test)?;
        info!(
            "{} features expanded to {} design matrix columns.",
            preprocessor.descriptors().len(),
            preprocessor.n_output_columns()
        );

        let data = SweepData {
            x_train: &x_train,
            y_train: train.target_values(),
            x_test: &x_test,
            y_test: test.target_values(),
            names: preprocessor.output_names(),
        };
        let sweep = FeatureSweep::new(search.best_params, config.seed, config.elimination_step).run(&data)?;
        let report = PcnReport::build(&search, &preprocessor, sweep, &data, config.seed)?;
        info!(
            "Pipeline finished in {:.2} seconds, best subset size {} with MAE {:.4}.",
            start.elapsed().as_secs_f64(),
            report.best_k,
            report.metrics.mae
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    #[test]
    fn test_invalid_config_is_rejected_before_work() {
        let table = SampleTable::new(
            vec![
                Column::numeric("Size", vec![1.0, 2.0, 3.0]),
                Column::numeric("PCN", vec![1.0, 2.0, 3.0]),
            ],
            "PCN",
        )
        .unwrap();
        let pipeline = PcnPipeline::new(PipelineConfig::default().set_cv_folds(1));
        assert!(matches!(
            pipeline.run(&table).unwrap_err(),
            PcnError::InvalidParameter(..)
        ));
    }

    #[test]
    fn test_too_few_training_rows_for_folds() {
        let table = SampleTable::new(
            vec![
                Column::numeric("Size", vec![1.0, 2.0, 3.0, 4.0]),
                Column::numeric("PCN", vec![1.0, 2.0, 3.0, 4.0]),
            ],
            "PCN",
        )
        .unwrap();
        // 3 training rows can not be split in 5 folds.
        let pipeline = PcnPipeline::new(PipelineConfig::default());
        assert!(matches!(
            pipeline.run(&table).unwrap_err(),
            PcnError::InvalidParameter(ref n, _, _) if n == "cv_folds"
        ));
    }
}
