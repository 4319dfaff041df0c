//! Writers for the four `;`-separated output datasets.
//!
//! Every dataset gets its header line even when it holds no record, so
//! downstream loaders always see a well-formed file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::{
    batch::{BatchOutputs, FileStats, RunContext},
    io_utils::open_csv_writer,
    partition::{InvalidRow, RowStats, ValidRow},
    schema::{EXECUTION_DATETIME_COLUMN, SOURCE_FILENAME_COLUMN, TableSchema},
};

pub const CSV_EXTENSION: &str = "csv";

/// Base names of the four datasets written for each table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub file_stats: String,
    pub row_stats: String,
    pub invalid_rows: String,
    pub valid_rows: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        OutputNames {
            file_stats: "file_stats".to_string(),
            row_stats: "rows_stats".to_string(),
            invalid_rows: "data_invalid".to_string(),
            valid_rows: "data_valid".to_string(),
        }
    }
}

/// Paths written for one table run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenOutputs {
    pub file_stats: PathBuf,
    pub row_stats: PathBuf,
    pub invalid_rows: PathBuf,
    pub valid_rows: PathBuf,
}

pub fn output_paths(dir: &Path, names: &OutputNames) -> WrittenOutputs {
    let path_for = |name: &str| dir.join(format!("{name}.{CSV_EXTENSION}"));
    WrittenOutputs {
        file_stats: path_for(&names.file_stats),
        row_stats: path_for(&names.row_stats),
        invalid_rows: path_for(&names.invalid_rows),
        valid_rows: path_for(&names.valid_rows),
    }
}

pub fn write_outputs(
    dir: &Path,
    names: &OutputNames,
    outputs: &BatchOutputs,
    schema: &TableSchema,
    context: &RunContext,
) -> Result<WrittenOutputs> {
    let paths = output_paths(dir, names);
    write_records(&paths.file_stats, &FileStats::HEADERS, &outputs.file_stats)?;
    write_records(&paths.row_stats, &RowStats::HEADERS, &outputs.row_stats)?;
    write_records(
        &paths.invalid_rows,
        &InvalidRow::HEADERS,
        &outputs.invalid_rows,
    )?;
    write_valid_rows(&paths.valid_rows, schema, &outputs.valid_rows, context)?;
    info!(
        "Wrote {} file stat(s), {} row stat(s), {} invalid and {} valid row(s) for table '{}'",
        outputs.file_stats.len(),
        outputs.row_stats.len(),
        outputs.invalid_rows.len(),
        outputs.valid_rows.len(),
        context.table
    );
    Ok(paths)
}

pub fn write_records<T>(path: &Path, headers: &[&str], records: &[T]) -> Result<()>
where
    T: Serialize,
{
    let mut writer = open_csv_writer(path)?;
    writer
        .write_record(headers)
        .with_context(|| format!("Writing header to {path:?}"))?;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Writing record to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

/// Writes valid rows under the schema's canonical column names. Synthetic
/// columns are filled from the row's file name and the ingestion timestamp.
pub fn write_valid_rows(
    path: &Path,
    schema: &TableSchema,
    rows: &[ValidRow],
    context: &RunContext,
) -> Result<()> {
    let mut writer = open_csv_writer(path)?;
    writer
        .write_record(schema.output_headers())
        .with_context(|| format!("Writing header to {path:?}"))?;
    let date_ingest = context.date_ingest();
    for row in rows {
        let mut file_values = row.values.iter();
        let record: Vec<String> = schema
            .columns()
            .iter()
            .map(|column| match column.name.as_str() {
                SOURCE_FILENAME_COLUMN => row.source_filename.clone(),
                EXECUTION_DATETIME_COLUMN => date_ingest.clone(),
                _ => file_values
                    .next()
                    .and_then(|value| value.as_ref())
                    .map(|value| value.as_display())
                    .unwrap_or_default(),
            })
            .collect();
        writer
            .write_record(&record)
            .with_context(|| format!("Writing record to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        schema::{ColumnSpec, ColumnType},
    };
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn context() -> RunContext {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        RunContext::new("0_landing_to_raw", "raw", "sales", ts)
    }

    #[test]
    fn empty_outputs_still_carry_headers() {
        let dir = tempdir().expect("temp dir");
        let schema =
            TableSchema::load(vec![ColumnSpec::new("id", ColumnType::Integer)]).expect("schema");
        let paths = write_outputs(
            dir.path(),
            &OutputNames::default(),
            &BatchOutputs::default(),
            &schema,
            &context(),
        )
        .expect("write outputs");

        assert_eq!(paths.valid_rows, dir.path().join("data_valid.csv"));
        assert_eq!(paths.row_stats, dir.path().join("rows_stats.csv"));
        assert_eq!(
            fs::read_to_string(&paths.file_stats).unwrap(),
            "pipeline;dataset;table;source_filename;date_ingest;is_invalid;description\n"
        );
        assert_eq!(
            fs::read_to_string(&paths.row_stats).unwrap().lines().next(),
            Some(RowStats::HEADERS.join(";").as_str())
        );
        assert_eq!(fs::read_to_string(&paths.valid_rows).unwrap(), "id\n");
    }

    #[test]
    fn valid_rows_fill_synthetic_columns() {
        let dir = tempdir().expect("temp dir");
        let schema = TableSchema::load(vec![
            ColumnSpec::new("id", ColumnType::Integer),
            ColumnSpec::new("price", ColumnType::Float),
            ColumnSpec::new(SOURCE_FILENAME_COLUMN, ColumnType::String),
            ColumnSpec::new("label", ColumnType::String),
            ColumnSpec::new(EXECUTION_DATETIME_COLUMN, ColumnType::String),
        ])
        .expect("schema");
        let rows = vec![ValidRow {
            source_filename: "landing/s.csv".to_string(),
            index: 0,
            values: vec![
                Some(Value::Integer(7)),
                Some(Value::Float(2.0)),
                Some(Value::String("a;b".to_string())),
            ],
        }];
        let path = dir.path().join("valid.csv");
        write_valid_rows(&path, &schema, &rows, &context()).expect("write");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "id;price;source_filename;label;execution_datetime\n\
             7;2.0;landing/s.csv;\"a;b\";2024-03-10 12:00:00\n"
        );
    }

    #[test]
    fn file_stats_serialize_booleans_as_words() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("fs.csv");
        let stats = vec![context().file_stats("landing/s.csv", true, "bad".to_string())];
        write_records(&path, &FileStats::HEADERS, &stats).expect("write");
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().nth(1),
            Some("0_landing_to_raw;raw;sales;landing/s.csv;2024-03-10 12:00:00;true;bad")
        );
    }
}
