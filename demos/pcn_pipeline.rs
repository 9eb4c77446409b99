//! Plasmid Copy Number Pipeline
//! ============================
//! Load a tab separated table of plasmid features, tune a random forest on
//! the training rows, sweep every subset size with recursive feature
//! elimination and print the report for the winning subset.
//!
//! A column is numeric when every non-empty value parses as a number, categorical
//! otherwise. The `PCN` column is the target.
//!
//! ```bash
//! cargo run --release --example pcn_pipeline -- resources/pcn_features.tsv [config.json]
//! ```

use plasmid_pcn::{Column, ColumnValues, JsonIO, PcnPipeline, PipelineConfig, SampleTable};
use std::env;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

const TARGET: &str = "PCN";

fn read_table(path: &str) -> Result<SampleTable, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for rec in rdr.records() {
        let rec = rec?;
        for (i, field) in rec.iter().enumerate() {
            let field = field.trim();
            raw[i].push(if field.is_empty() { None } else { Some(field.to_string()) });
        }
    }

    let columns = headers
        .iter()
        .zip(raw)
        .map(|(name, values)| infer_column(name, values))
        .collect();
    Ok(SampleTable::new(columns, TARGET)?)
}

/// Numeric when every non-empty field parses as a number. Empty fields stay
/// missing (`NaN` or `None`) so the table reports them.
fn infer_column(name: &str, values: Vec<Option<String>>) -> Column {
    let parsed: Result<Vec<f64>, _> = values
        .iter()
        .map(|v| match v {
            Some(v) => v.parse::<f64>(),
            None => Ok(f64::NAN),
        })
        .collect();
    match parsed {
        Ok(numeric) => Column::numeric(name, numeric),
        Err(_) => Column {
            name: name.to_string(),
            values: ColumnValues::Categorical(values),
        },
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    let data_path = args.get(1).map(|s| s.as_str()).unwrap_or("resources/pcn_features.tsv");

    // ------------------------------------------------------------------
    // 1. Load data
    // ------------------------------------------------------------------
    let table = read_table(data_path)?;
    println!(
        "Loaded {} rows with {} features: {:?}",
        table.n_rows(),
        table.feature_columns().len(),
        table.feature_names()
    );

    // ------------------------------------------------------------------
    // 2. Configure
    // ------------------------------------------------------------------
    let config = match args.get(2) {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    };

    // ------------------------------------------------------------------
    // 3. Tune, select and report
    // ------------------------------------------------------------------
    let report = PcnPipeline::new(config).run(&table)?;
    println!("\n{}", report);

    // ------------------------------------------------------------------
    // 4. Save results
    // ------------------------------------------------------------------
    report.sweep.save_table("pcn_subset_results.tsv", b'\t')?;
    report.save_json("pcn_report.json")?;
    println!("Wrote pcn_subset_results.tsv and pcn_report.json");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmid_pcn::PcnError;

    fn field(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn test_empty_numeric_field_is_missing() {
        let size = infer_column("Size", vec![field("1.5"), None, field("3")]);
        match &size.values {
            ColumnValues::Numeric(v) => assert!(v[1].is_nan()),
            ColumnValues::Categorical(_) => panic!("Size should be numeric"),
        }
        let host = infer_column("Host", vec![field("E.coli"), None, field("Klebsiella")]);
        assert_eq!(host.values.n_missing(), 1);

        let pcn = Column::numeric("PCN", vec![1.0, 2.0, 3.0]);
        let err = SampleTable::new(vec![size, host, pcn], TARGET).unwrap_err();
        assert!(matches!(err, PcnError::MissingValues(ref c, 1) if c == "Size"));
    }
}
