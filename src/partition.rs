//! Assembly of the valid, invalid and row-statistics datasets for one file.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{
    batch::RunContext,
    classify::{ReasonCode, Violation},
    data::{Cell, Value, classify_cell},
    schema::TableSchema,
    structure::{ParsedTable, RawRow},
};

/// One fully attributed violation, as loaded into the invalid-data table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidRow {
    pub pipeline: String,
    pub dataset: String,
    pub table: String,
    pub source_filename: String,
    pub index: usize,
    pub invalid_reason: String,
    pub invalid_code: String,
    pub invalid_col_name: String,
    pub invalid_col_value: String,
    pub date_ingest: String,
}

impl InvalidRow {
    pub const HEADERS: [&'static str; 10] = [
        "pipeline",
        "dataset",
        "table",
        "source_filename",
        "index",
        "invalid_reason",
        "invalid_code",
        "invalid_col_name",
        "invalid_col_value",
        "date_ingest",
    ];
}

/// A row with no violation. `values` follow the schema's file-facing columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRow {
    pub source_filename: String,
    pub index: usize,
    pub values: Vec<Option<Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowStats {
    pub pipeline: String,
    pub dataset: String,
    pub table: String,
    pub source_filename: String,
    pub date_ingest: String,
    pub nb_valid_lines: usize,
    pub nb_invalid_lines: usize,
    #[serde(rename = "nb_invalid_lines_NULL_VALUE_NOT_EXPECTED")]
    pub nb_invalid_lines_null_value_not_expected: usize,
    #[serde(rename = "nb_invalid_lines_KEY_NOT_UNIQUE")]
    pub nb_invalid_lines_key_not_unique: usize,
    #[serde(rename = "nb_invalid_lines_COLUMN_NOT_PARSABLE")]
    pub nb_invalid_lines_column_not_parsable: usize,
}

impl RowStats {
    pub const HEADERS: [&'static str; 10] = [
        "pipeline",
        "dataset",
        "table",
        "source_filename",
        "date_ingest",
        "nb_valid_lines",
        "nb_invalid_lines",
        "nb_invalid_lines_NULL_VALUE_NOT_EXPECTED",
        "nb_invalid_lines_KEY_NOT_UNIQUE",
        "nb_invalid_lines_COLUMN_NOT_PARSABLE",
    ];

    pub fn invalid_lines_for(&self, code: ReasonCode) -> usize {
        match code {
            ReasonCode::NullValueNotExpected => self.nb_invalid_lines_null_value_not_expected,
            ReasonCode::KeyNotUnique => self.nb_invalid_lines_key_not_unique,
            ReasonCode::ColumnNotParsable => self.nb_invalid_lines_column_not_parsable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub valid_rows: Vec<ValidRow>,
    pub invalid_rows: Vec<InvalidRow>,
    pub row_stats: RowStats,
}

pub fn partition(
    table: &ParsedTable,
    schema: &TableSchema,
    violations: &[Violation],
    context: &RunContext,
) -> Partition {
    let date_ingest = context.date_ingest();

    let mut invalid_rows: Vec<InvalidRow> = violations
        .iter()
        .map(|violation| InvalidRow {
            pipeline: context.pipeline.clone(),
            dataset: context.dataset.clone(),
            table: context.table.clone(),
            source_filename: table.source_filename.clone(),
            index: violation.row_index,
            invalid_reason: violation.reason.clone(),
            invalid_code: violation.code.to_string(),
            invalid_col_name: violation.column.clone(),
            invalid_col_value: violation.value.clone().unwrap_or_default(),
            date_ingest: date_ingest.clone(),
        })
        .collect();
    invalid_rows.sort_by(|a, b| invalid_order(a).cmp(&invalid_order(b)));

    let mut rows_by_code: BTreeMap<ReasonCode, BTreeSet<usize>> = BTreeMap::new();
    for violation in violations {
        rows_by_code
            .entry(violation.code)
            .or_default()
            .insert(violation.row_index);
    }
    let invalid_indices: BTreeSet<usize> = violations.iter().map(|v| v.row_index).collect();

    let mut valid_rows: Vec<ValidRow> = table
        .rows
        .iter()
        .filter(|row| !invalid_indices.contains(&row.index))
        .map(|row| normalize_row(&table.source_filename, row, schema))
        .collect();
    valid_rows.sort_by(|a, b| valid_order(a).cmp(&valid_order(b)));

    let distinct = |code: ReasonCode| rows_by_code.get(&code).map_or(0, BTreeSet::len);
    let row_stats = RowStats {
        pipeline: context.pipeline.clone(),
        dataset: context.dataset.clone(),
        table: context.table.clone(),
        source_filename: table.source_filename.clone(),
        date_ingest,
        nb_valid_lines: valid_rows.len(),
        nb_invalid_lines: invalid_indices.len(),
        nb_invalid_lines_null_value_not_expected: distinct(ReasonCode::NullValueNotExpected),
        nb_invalid_lines_key_not_unique: distinct(ReasonCode::KeyNotUnique),
        nb_invalid_lines_column_not_parsable: distinct(ReasonCode::ColumnNotParsable),
    };

    Partition {
        valid_rows,
        invalid_rows,
        row_stats,
    }
}

pub(crate) fn invalid_order(row: &InvalidRow) -> (&str, &str, usize) {
    (&row.table, &row.source_filename, row.index)
}

pub(crate) fn valid_order(row: &ValidRow) -> (&str, usize) {
    (&row.source_filename, row.index)
}

fn normalize_row(source_filename: &str, row: &RawRow, schema: &TableSchema) -> ValidRow {
    let values = schema
        .file_columns()
        .map(|(position, column)| {
            let raw = row.value(position);
            match classify_cell(raw, column) {
                Cell::Parsed(value) => Some(value),
                Cell::NullAllowed | Cell::NullRequired => None,
                // a row without violations never holds an unparsable cell
                Cell::Unparsable => raw.map(|value| Value::String(value.to_string())),
            }
        })
        .collect();
    ValidRow {
        source_filename: source_filename.to_string(),
        index: row.index,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::classify,
        schema::{ColumnSpec, ColumnType},
    };
    use chrono::NaiveDate;

    fn context() -> RunContext {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 1)
            .unwrap();
        RunContext::new("0_landing_to_raw", "raw", "orders", ts)
    }

    fn schema() -> TableSchema {
        TableSchema::load(vec![
            ColumnSpec::new("id", ColumnType::Integer)
                .required()
                .unique_key(),
            ColumnSpec::new("day", ColumnType::Date)
                .required()
                .with_date_format("%d/%m/%Y"),
        ])
        .expect("schema")
    }

    fn table(rows: &[[Option<&str>; 2]]) -> ParsedTable {
        ParsedTable::from_records(
            "landing/orders.csv",
            vec!["id".to_string(), "day".to_string()],
            rows.iter()
                .map(|row| row.iter().map(|v| v.map(str::to_string)).collect())
                .collect(),
        )
    }

    #[test]
    fn counts_distinct_rows_per_code() {
        let table = table(&[
            [Some("1"), Some("01/02/2024")],
            [None, None],
            [Some("x"), None],
            [Some("4"), Some("2024-02-01")],
        ]);
        // row 1 is blank and dropped; row 2 fails on two different codes
        let schema = schema();
        let violations = classify(&table, &schema);
        let result = partition(&table, &schema, &violations, &context());

        let stats = &result.row_stats;
        assert_eq!(stats.nb_valid_lines, 1);
        assert_eq!(stats.nb_invalid_lines, 2);
        assert_eq!(stats.nb_invalid_lines_null_value_not_expected, 1);
        assert_eq!(stats.nb_invalid_lines_column_not_parsable, 2);
        assert_eq!(stats.nb_invalid_lines_key_not_unique, 0);
        assert_eq!(stats.date_ingest, "2024-02-29 23:59:01");
    }

    #[test]
    fn valid_rows_carry_parsed_dates() {
        let table = table(&[[Some("1"), Some("01/02/2024")]]);
        let schema = schema();
        let result = partition(&table, &schema, &[], &context());
        assert!(result.invalid_rows.is_empty());
        assert_eq!(
            result.valid_rows[0].values,
            vec![
                Some(Value::Integer(1)),
                Some(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())),
            ]
        );
    }

    #[test]
    fn invalid_rows_are_attributed_and_sorted_by_index() {
        let table = table(&[
            [Some("1"), Some("bad")],
            [Some("1"), Some("01/01/2024")],
        ]);
        let schema = schema();
        let violations = classify(&table, &schema);
        let result = partition(&table, &schema, &violations, &context());

        let summary: Vec<_> = result
            .invalid_rows
            .iter()
            .map(|row| (row.index, row.invalid_code.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "KEY_NOT_UNIQUE"),
                (0, "COLUMN_NOT_PARSABLE"),
                (1, "KEY_NOT_UNIQUE"),
            ]
        );
        let first = &result.invalid_rows[0];
        assert_eq!(first.pipeline, "0_landing_to_raw");
        assert_eq!(first.table, "orders");
        assert_eq!(first.source_filename, "landing/orders.csv");
        assert_eq!(first.invalid_col_value, "['1']");
        assert!(result.valid_rows.is_empty());
    }
}
