//! Errors
//!
//! Custom error types used throughout the `plasmid_pcn` crate.
use thiserror::Error;

/// Errors that can occur while preparing data, tuning or sweeping the forest.
#[derive(Debug, Error)]
pub enum PcnError {
    /// The table has no rows, or no feature columns besides the target.
    #[error("The sample table is empty: {0}.")]
    EmptyTable(String),
    /// Target column was not found among the table columns.
    #[error("Target column {0} was not found in the table.")]
    MissingTarget(String),
    /// Target column is categorical.
    #[error("Target column {0} must be numeric.")]
    TargetNotNumeric(String),
    /// Two columns share the same name.
    #[error("Column name {0} appears more than once.")]
    DuplicateColumn(String),
    /// A column does not have the same number of rows as the others.
    #[error("Column {0} has {1} rows, expected {2}.")]
    RaggedColumn(String, usize, usize),
    /// Missing values reached the model stage.
    #[error("Column {0} contains {1} missing or non-finite values, missing values are not imputed.")]
    MissingValues(String, usize),
    /// A table passed to a fitted transform does not match the fitted schema.
    #[error("Column {0} does not match the fitted schema: {1}.")]
    SchemaMismatch(String, String),
    /// Invalid value parsing.
    #[error("Invalid value {0} passed for {1}, expected one of {2}.")]
    ParseString(String, String, String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// Matrix and target (or row count) dimensions disagree.
    #[error("Shape mismatch: {0}.")]
    ShapeMismatch(String),
    /// Every feature column is constant on the training rows.
    #[error("Unable to fit the forest: all {0} feature columns are constant on the training rows.")]
    DegenerateFeatures(usize),
    /// Every candidate configuration failed to fit during the search.
    #[error("No hyperparameter candidate could be fitted, {0} candidates failed.")]
    NoCandidates(usize),
    /// Every subset size failed to fit during the sweep.
    #[error("No feature subset could be evaluated, {0} subset sizes failed.")]
    NoFeasibleSubset(usize),
    /// Unable to build the worker pool.
    #[error("Unable to build the worker pool: {0}")]
    ThreadPool(String),
    /// Unable to write output to file.
    #[error("Unable to write output to file: {0}")]
    UnableToWrite(String),
    /// Unable to read input from file.
    #[error("Unable to read input from a file {0}")]
    UnableToRead(String),
}

impl PcnError {
    /// Whether the error belongs to a single candidate or subset fit, and can be
    /// recorded while the search or sweep continues.
    pub fn is_fit_error(&self) -> bool {
        matches!(
            self,
            PcnError::ShapeMismatch(_)
                | PcnError::DegenerateFeatures(_)
                | PcnError::EmptyTable(_)
                | PcnError::InvalidParameter(..)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = PcnError::MissingValues("Host".to_string(), 3);
        assert_eq!(
            e.to_string(),
            "Column Host contains 3 missing or non-finite values, missing values are not imputed."
        );
        let e = PcnError::InvalidParameter("cv_folds".to_string(), "at least 2".to_string(), "1".to_string());
        assert_eq!(
            e.to_string(),
            "Invalid parameter value passed for cv_folds, expected at least 2 but 1 provided."
        );
    }

    #[test]
    fn test_fit_error_classification() {
        assert!(PcnError::DegenerateFeatures(1).is_fit_error());
        assert!(!PcnError::MissingTarget("PCN".to_string()).is_fit_error());
    }
}
