// Modules
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod forest;
pub mod metric;
pub mod params;
pub mod pipeline;
pub mod preprocessing;
pub mod report;
pub mod runner;
pub mod sampler;
pub mod search;
pub mod selection;
pub mod split;
pub mod table;
pub mod tree;
pub mod utils;

// Individual classes, and functions
pub use config::{JsonIO, PipelineConfig, RefinementConfig};
pub use data::{DesignMatrix, Matrix};
pub use errors::PcnError;
pub use forest::RandomForestRegressor;
pub use metric::Metric;
pub use params::{ForestParams, MaxFeatures, ParamDistributions};
pub use preprocessing::CategoricalEncoding;
pub use report::PcnReport;
pub use runner::PcnPipeline;
pub use selection::select_best;
pub use table::{Column, ColumnValues, SampleTable};
