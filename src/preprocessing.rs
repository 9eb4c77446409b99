//! Preprocessing
//!
//! Turns the feature columns of a [`SampleTable`] into a single numeric design matrix.
//! Numeric columns are robust scaled, categorical columns are ordinal or one-hot encoded.
//! The fitted preprocessor keeps the mapping between output columns and the features
//! they came from, so selected columns and importances can be named again later.
use crate::constants::UNKNOWN_CATEGORY_CODE;
use crate::data::DesignMatrix;
use crate::errors::PcnError;
use crate::table::{ColumnValues, SampleTable};
use crate::utils::percentiles;
use hashbrown::HashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Whether a feature was numeric or categorical in the input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// Identity of an input feature, created once when the preprocessor is fitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
    /// Position of the feature among the table's feature columns.
    pub column_index: usize,
}

/// How categorical columns are turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CategoricalEncoding {
    /// One integer code per category, a single output column.
    #[default]
    Ordinal,
    /// One indicator column per category.
    OneHot,
}

/// A fitted transform of a single input column.
pub trait ColumnTransform {
    /// Names of the output columns this transform produces, in output order.
    fn output_names(&self) -> Vec<String>;
    /// Transform the values of the column, returning one vector per output column.
    fn transform(&self, values: &ColumnValues) -> Result<Vec<Vec<f64>>, PcnError>;
    /// Number of output columns.
    fn n_outputs(&self) -> usize {
        self.output_names().len()
    }
}

/// Centre on the median and scale by the interquartile range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    pub name: String,
    pub center: f64,
    pub scale: f64,
}

impl RobustScaler {
    pub fn fit(name: &str, values: &[f64]) -> Self {
        let q = percentiles(values, &[0.25, 0.5, 0.75]);
        let iqr = q[2] - q[0];
        // A zero spread would divide by zero; leave such columns unscaled.
        let scale = if iqr == 0.0 || !iqr.is_finite() { 1.0 } else { iqr };
        RobustScaler {
            name: name.to_string(),
            center: q[1],
            scale,
        }
    }
}

impl ColumnTransform for RobustScaler {
    fn output_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn transform(&self, values: &ColumnValues) -> Result<Vec<Vec<f64>>, PcnError> {
        match values {
            ColumnValues::Numeric(v) => Ok(vec![v.iter().map(|x| (x - self.center) / self.scale).collect()]),
            ColumnValues::Categorical(_) => Err(PcnError::SchemaMismatch(
                self.name.clone(),
                "fitted as numeric, got categorical values".to_string(),
            )),
        }
    }
}

/// Sorted vocabulary of the categories observed at fit time.
fn vocabulary(values: &[Option<String>]) -> Vec<String> {
    let mut categories: Vec<String> = values.iter().flatten().cloned().collect();
    categories.sort();
    categories.dedup();
    categories
}

fn categorical_values<'a>(name: &str, values: &'a ColumnValues) -> Result<&'a [Option<String>], PcnError> {
    match values {
        ColumnValues::Categorical(v) => Ok(v),
        ColumnValues::Numeric(_) => Err(PcnError::SchemaMismatch(
            name.to_string(),
            "fitted as categorical, got numeric values".to_string(),
        )),
    }
}

/// Ordered integer codes, `1..=n_categories`, unseen categories get
/// [`UNKNOWN_CATEGORY_CODE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    pub name: String,
    pub categories: Vec<String>,
    codes: HashMap<String, usize>,
}

impl OrdinalEncoder {
    pub fn fit(name: &str, values: &[Option<String>]) -> Self {
        let categories = vocabulary(values);
        let codes = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i + 1))
            .collect();
        OrdinalEncoder {
            name: name.to_string(),
            categories,
            codes,
        }
    }

    pub fn code(&self, category: &str) -> Option<usize> {
        self.codes.get(category).copied()
    }
}

impl ColumnTransform for OrdinalEncoder {
    fn output_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn transform(&self, values: &ColumnValues) -> Result<Vec<Vec<f64>>, PcnError> {
        let values = categorical_values(&self.name, values)?;
        let mut n_unknown = 0;
        let encoded = values
            .iter()
            .map(|v| match v.as_deref().and_then(|c| self.code(c)) {
                Some(code) => code as f64,
                None => {
                    n_unknown += 1;
                    UNKNOWN_CATEGORY_CODE
                }
            })
            .collect();
        if n_unknown > 0 {
            debug!("{} values of {} were not seen at fit time.", n_unknown, self.name);
        }
        Ok(vec![encoded])
    }
}

/// One indicator column per category, unseen categories get all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub name: String,
    pub categories: Vec<String>,
    positions: HashMap<String, usize>,
}

impl OneHotEncoder {
    pub fn fit(name: &str, values: &[Option<String>]) -> Self {
        let categories = vocabulary(values);
        let positions = categories
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        OneHotEncoder {
            name: name.to_string(),
            categories,
            positions,
        }
    }
}

impl ColumnTransform for OneHotEncoder {
    fn output_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| format!("{}_{}", self.name, c))
            .collect()
    }

    fn transform(&self, values: &ColumnValues) -> Result<Vec<Vec<f64>>, PcnError> {
        let values = categorical_values(&self.name, values)?;
        let mut out = vec![vec![0.0; values.len()]; self.categories.len()];
        let mut n_unknown = 0;
        for (row, v) in values.iter().enumerate() {
            match v.as_deref().and_then(|c| self.positions.get(c)) {
                Some(&pos) => out[pos][row] = 1.0,
                None => n_unknown += 1,
            }
        }
        if n_unknown > 0 {
            debug!("{} values of {} were not seen at fit time.", n_unknown, self.name);
        }
        Ok(out)
    }
}

/// Any of the fitted column transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedTransform {
    Robust(RobustScaler),
    Ordinal(OrdinalEncoder),
    OneHot(OneHotEncoder),
}

impl FittedTransform {
    fn inner(&self) -> &dyn ColumnTransform {
        match self {
            FittedTransform::Robust(t) => t,
            FittedTransform::Ordinal(t) => t,
            FittedTransform::OneHot(t) => t,
        }
    }

    /// Categories learned at fit time, empty for numeric columns.
    pub fn categories(&self) -> &[String] {
        match self {
            FittedTransform::Robust(_) => &[],
            FittedTransform::Ordinal(t) => &t.categories,
            FittedTransform::OneHot(t) => &t.categories,
        }
    }
}

impl ColumnTransform for FittedTransform {
    fn output_names(&self) -> Vec<String> {
        self.inner().output_names()
    }

    fn transform(&self, values: &ColumnValues) -> Result<Vec<Vec<f64>>, PcnError> {
        self.inner().transform(values)
    }
}

/// Unfitted preprocessor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Preprocessor {
    pub encoding: CategoricalEncoding,
}

impl Preprocessor {
    pub fn new(encoding: CategoricalEncoding) -> Self {
        Preprocessor { encoding }
    }

    /// Learn scaling statistics and vocabularies from the rows of `table`.
    /// Only ever call this with training rows.
    pub fn fit(&self, table: &SampleTable) -> Result<FittedPreprocessor, PcnError> {
        let mut descriptors = Vec::new();
        let mut transforms = Vec::new();
        for (i, column) in table.feature_columns().iter().enumerate() {
            let (kind, transform) = match &column.values {
                ColumnValues::Numeric(v) => (FeatureKind::Numeric, FittedTransform::Robust(RobustScaler::fit(&column.name, v))),
                ColumnValues::Categorical(v) => {
                    let t = match self.encoding {
                        CategoricalEncoding::Ordinal => FittedTransform::Ordinal(OrdinalEncoder::fit(&column.name, v)),
                        CategoricalEncoding::OneHot => FittedTransform::OneHot(OneHotEncoder::fit(&column.name, v)),
                    };
                    (FeatureKind::Categorical, t)
                }
            };
            descriptors.push(FeatureDescriptor {
                name: column.name.clone(),
                kind,
                column_index: i,
            });
            transforms.push(transform);
        }
        Ok(FittedPreprocessor::new(descriptors, transforms))
    }
}

/// Description of a single output column, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub index: usize,
    pub name: String,
    pub feature: FeatureDescriptor,
    /// `<feature>_<category>` labels the column stands for, empty for numeric features.
    pub category_labels: Vec<String>,
}

/// Preprocessor fitted on the training partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    descriptors: Vec<FeatureDescriptor>,
    transforms: Vec<FittedTransform>,
    output_names: Vec<String>,
    /// Output columns owned by each feature.
    output_ranges: Vec<Range<usize>>,
    /// Feature owning each output column.
    output_owner: Vec<usize>,
}

impl FittedPreprocessor {
    fn new(descriptors: Vec<FeatureDescriptor>, transforms: Vec<FittedTransform>) -> Self {
        let mut output_names = Vec::new();
        let mut output_ranges = Vec::with_capacity(transforms.len());
        let mut output_owner = Vec::new();
        for (i, t) in transforms.iter().enumerate() {
            let names = t.output_names();
            let start = output_names.len();
            output_owner.extend(std::iter::repeat(i).take(names.len()));
            output_names.extend(names);
            output_ranges.push(start..output_names.len());
        }
        FittedPreprocessor {
            descriptors,
            transforms,
            output_names,
            output_ranges,
            output_owner,
        }
    }

    /// Apply the fitted transforms, never refitting.
    pub fn transform(&self, table: &SampleTable) -> Result<DesignMatrix, PcnError> {
        let columns = table.feature_columns();
        if columns.len() != self.descriptors.len() {
            return Err(PcnError::SchemaMismatch(
                table.target_name().to_string(),
                format!(
                    "expected {} feature columns, found {}",
                    self.descriptors.len(),
                    columns.len()
                ),
            ));
        }
        let mut outputs = Vec::with_capacity(self.output_names.len());
        for ((descriptor, transform), column) in self.descriptors.iter().zip(&self.transforms).zip(columns) {
            if descriptor.name != column.name {
                return Err(PcnError::SchemaMismatch(
                    column.name.clone(),
                    format!("expected column {} at this position", descriptor.name),
                ));
            }
            outputs.extend(transform.transform(&column.values)?);
        }
        Ok(DesignMatrix::from_columns(outputs, table.n_rows()))
    }

    pub fn n_output_columns(&self) -> usize {
        self.output_names.len()
    }

    /// Names of all output columns, in output order.
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn descriptors(&self) -> &[FeatureDescriptor] {
        &self.descriptors
    }

    /// Feature an output column was produced from.
    pub fn descriptor_for_output(&self, column: usize) -> Option<&FeatureDescriptor> {
        self.output_owner.get(column).map(|&f| &self.descriptors[f])
    }

    /// Output columns produced by a feature.
    pub fn output_columns_for(&self, feature: usize) -> Option<Range<usize>> {
        self.output_ranges.get(feature).cloned()
    }

    /// Categories of a feature learned at fit time, empty for numeric features.
    pub fn vocabulary(&self, feature: usize) -> &[String] {
        self.transforms.get(feature).map(|t| t.categories()).unwrap_or(&[])
    }

    /// `<feature>_<category>` labels of a categorical feature.
    pub fn category_labels(&self, feature: usize) -> Vec<String> {
        let name = match self.descriptors.get(feature) {
            Some(d) => &d.name,
            None => return Vec::new(),
        };
        self.vocabulary(feature)
            .iter()
            .map(|c| format!("{}_{}", name, c))
            .collect()
    }

    /// Describe an output column, expanding categorical encodings into their category labels.
    pub fn describe_output(&self, column: usize) -> Option<OutputColumn> {
        let feature = *self.output_owner.get(column)?;
        let descriptor = self.descriptors[feature].clone();
        let category_labels = match &self.transforms[feature] {
            FittedTransform::Robust(_) => Vec::new(),
            // Indicator columns stand for exactly one category.
            FittedTransform::OneHot(_) => vec![self.output_names[column].clone()],
            FittedTransform::Ordinal(_) => self.category_labels(feature),
        };
        Some(OutputColumn {
            index: column,
            name: self.output_names[column].clone(),
            feature: descriptor,
            category_labels,
        })
    }
}
