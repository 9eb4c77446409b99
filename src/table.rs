//! Sample Table
//!
//! Typed, in-memory table of observations. The loader decides whether a column is
//! numeric or categorical; the table only checks the schema invariants the model
//! stage relies on: a single numeric target, equally long columns, unique names,
//! and no missing values.
use crate::errors::PcnError;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

/// Values of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    /// Numeric values, `NaN` marks a missing value. Infinite values are
    /// rejected like missing ones.
    Numeric(Vec<f64>),
    /// Categorical values, `None` marks a missing value.
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of missing or non-finite values in the column.
    pub fn n_missing(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.iter().filter(|x| !x.is_finite()).count(),
            ColumnValues::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn take(&self, rows: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Numeric(v) => ColumnValues::Numeric(rows.iter().map(|&r| v[r]).collect()),
            ColumnValues::Categorical(v) => ColumnValues::Categorical(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }
}

/// A named column of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Column {
            name: name.to_string(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Categorical column without missing values.
    pub fn categorical(name: &str, values: Vec<&str>) -> Self {
        Column {
            name: name.to_string(),
            values: ColumnValues::Categorical(values.into_iter().map(|v| Some(v.to_string())).collect()),
        }
    }
}

/// Validated table of feature columns plus one numeric target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    features: Vec<Column>,
    target_name: String,
    target: Vec<f64>,
}

impl SampleTable {
    /// Build a table from its columns, one of which is the target.
    ///
    /// * `columns` - All columns, in input order.
    /// * `target` - Name of the target column.
    pub fn new(columns: Vec<Column>, target: &str) -> Result<Self, PcnError> {
        {
            let mut seen = HashSet::new();
            for c in columns.iter() {
                if !seen.insert(c.name.as_str()) {
                    return Err(PcnError::DuplicateColumn(c.name.clone()));
                }
            }
        }

        let n_rows = columns.first().map(|c| c.values.len()).unwrap_or(0);
        for c in columns.iter() {
            if c.values.len() != n_rows {
                return Err(PcnError::RaggedColumn(c.name.clone(), c.values.len(), n_rows));
            }
        }
        if n_rows == 0 {
            return Err(PcnError::EmptyTable("no rows".to_string()));
        }

        let mut target_values = None;
        let mut features = Vec::with_capacity(columns.len().saturating_sub(1));
        for c in columns {
            if c.name == target {
                match c.values {
                    ColumnValues::Numeric(v) => target_values = Some(v),
                    ColumnValues::Categorical(_) => return Err(PcnError::TargetNotNumeric(c.name)),
                }
            } else {
                features.push(c);
            }
        }
        let target_values = target_values.ok_or_else(|| PcnError::MissingTarget(target.to_string()))?;

        if features.is_empty() {
            return Err(PcnError::EmptyTable("no feature columns besides the target".to_string()));
        }

        let n_missing_target = target_values.iter().filter(|v| !v.is_finite()).count();
        if n_missing_target > 0 {
            return Err(PcnError::MissingValues(target.to_string(), n_missing_target));
        }
        for c in features.iter() {
            let n_missing = c.values.n_missing();
            if n_missing > 0 {
                return Err(PcnError::MissingValues(c.name.clone(), n_missing));
            }
        }

        Ok(SampleTable {
            features,
            target_name: target.to_string(),
            target: target_values,
        })
    }

    /// Number of observations.
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target_values(&self) -> &[f64] {
        &self.target
    }

    /// Feature columns, target excluded, in input order.
    pub fn feature_columns(&self) -> &[Column] {
        &self.features
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.features.iter().map(|c| c.name.as_str()).collect()
    }

    /// A new table holding only the given rows, in the order given.
    pub fn take_rows(&self, rows: &[usize]) -> SampleTable {
        SampleTable {
            features: self
                .features
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.take(rows),
                })
                .collect(),
            target_name: self.target_name.clone(),
            target: rows.iter().map(|&r| self.target[r]).collect(),
        }
    }
}
