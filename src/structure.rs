//! File-level structural checks.
//!
//! A landing file is parsed entirely as strings (no type coercion happens
//! here) according to its extension, then its header is compared, in order,
//! against the schema's file-facing column names. Only a file that parses and
//! carries exactly the expected header yields a [`ParsedTable`] for the row
//! classifier.

use std::{collections::HashSet, io::Cursor, path::Path};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use encoding_rs::UTF_8;
use log::{debug, info, warn};

use crate::{
    batch::{FileStats, RunContext},
    data::DATETIME_OUTPUT_FORMAT,
    error::FileParseError,
    io_utils,
    schema::{CsvHints, SpreadsheetHints, TableParams},
};

pub const FILE_VALID: &str = "File is VALID";
pub const COLUMNS_MISMATCH: &str = "Columns do not respect the columns definition";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xlsm,
    Json,
}

impl FileFormat {
    pub fn detect(name: &str) -> Result<Self, FileParseError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "xlsm" => Ok(FileFormat::Xlsm),
            "json" | "jsonl" | "ndjson" => Ok(FileFormat::Json),
            _ => Err(FileParseError::UnsupportedFormat(extension.to_string())),
        }
    }
}

/// One data row of a landing file. `index` is the 0-based position of the
/// record after the header and survives blank-row removal unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub index: usize,
    pub values: Vec<Option<String>>,
}

impl RawRow {
    pub fn value(&self, position: usize) -> Option<&str> {
        self.values.get(position).and_then(|value| value.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable {
    pub source_filename: String,
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl ParsedTable {
    /// Builds a table from raw records: embedded newlines become spaces and
    /// rows with no non-null value are dropped.
    pub fn from_records(
        source_filename: &str,
        headers: Vec<String>,
        records: Vec<Vec<Option<String>>>,
    ) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .filter(|(_, values)| values.iter().any(Option::is_some))
            .map(|(index, values)| RawRow {
                index,
                values: values
                    .into_iter()
                    .map(|value| value.map(flatten_newlines))
                    .collect(),
            })
            .collect();
        ParsedTable {
            source_filename: source_filename.to_string(),
            headers,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn flatten_newlines(value: String) -> String {
    if value.contains('\n') {
        value.replace("\r\n", " ").replace('\n', " ")
    } else {
        value
    }
}

#[derive(Debug, Clone)]
pub struct RawGrid {
    pub headers: Vec<String>,
    pub records: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone)]
pub struct FileCheck {
    pub table: Option<ParsedTable>,
    pub stats: FileStats,
    pub is_valid: bool,
}

impl FileCheck {
    pub fn rejected(name: &str, description: String, context: &RunContext) -> Self {
        FileCheck {
            table: None,
            stats: context.file_stats(name, true, description),
            is_valid: false,
        }
    }
}

pub fn check(name: &str, bytes: &[u8], params: &TableParams, context: &RunContext) -> FileCheck {
    let grid = match parse_file(name, bytes, params) {
        Ok(grid) => grid,
        Err(err) => {
            warn!("The file '{name}' could not be read: {err}");
            return FileCheck::rejected(name, err.to_string(), context);
        }
    };

    let expected = params.schema.column_names_in_order();
    debug!("Columns found {:?}, expected {:?}", grid.headers, expected);
    if grid.headers != expected {
        warn!("The file '{name}' is INVALID");
        return FileCheck::rejected(name, COLUMNS_MISMATCH.to_string(), context);
    }

    info!("The file '{name}' is VALID");
    let table = ParsedTable::from_records(name, grid.headers, grid.records);
    FileCheck {
        table: Some(table),
        stats: context.file_stats(name, false, FILE_VALID.to_string()),
        is_valid: true,
    }
}

pub fn parse_file(
    name: &str,
    bytes: &[u8],
    params: &TableParams,
) -> Result<RawGrid, FileParseError> {
    match FileFormat::detect(name)? {
        FileFormat::Csv => parse_delimited(bytes, &params.csv),
        FileFormat::Xlsx => parse_spreadsheet(bytes, &params.xlsx, &params.csv),
        FileFormat::Xlsm => parse_spreadsheet(bytes, &params.xlsm, &params.csv),
        FileFormat::Json => parse_json(bytes),
    }
}

pub fn parse_delimited(bytes: &[u8], hints: &CsvHints) -> Result<RawGrid, FileParseError> {
    debug!(
        "Reading CSV with delimiter '{}' and encoding {}",
        crate::printable_delimiter(hints.delimiter),
        hints.encoding.name()
    );
    let text = io_utils::decode_bytes(bytes, hints.encoding, "CSV")?;
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), hints.delimiter);
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() > headers.len() {
            return Err(FileParseError::CsvWidth {
                expected: headers.len(),
                found: record.len(),
                line: record.position().map_or(0, |pos| pos.line()),
            });
        }
        let mut values: Vec<Option<String>> = record
            .iter()
            .map(|field| (!hints.is_null(field)).then(|| field.to_string()))
            .collect();
        values.resize(headers.len(), None);
        records.push(values);
    }
    Ok(RawGrid { headers, records })
}

pub fn parse_spreadsheet(
    bytes: &[u8],
    hints: &SpreadsheetHints,
    nulls: &CsvHints,
) -> Result<RawGrid, FileParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet = match &hints.sheet_name {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| FileParseError::Spreadsheet("Workbook has no sheet".to_string()))?,
    };
    let range = workbook.worksheet_range(&sheet)?;
    let Some((last_row, last_col)) = range.end() else {
        return Ok(RawGrid {
            headers: Vec::new(),
            records: Vec::new(),
        });
    };
    let columns: Vec<u32> = match &hints.columns {
        Some(selected) => selected.clone(),
        None => (0..=last_col).collect(),
    };
    let mut rows = (hints.skip_rows..=last_row).map(|row| {
        columns
            .iter()
            .map(|&col| {
                range
                    .get_value((row, col))
                    .and_then(render_spreadsheet_cell)
                    .filter(|value| !nulls.is_null(value))
            })
            .collect::<Vec<_>>()
    });
    let headers = rows
        .next()
        .map(|cells| cells.into_iter().map(Option::unwrap_or_default).collect())
        .unwrap_or_default();
    Ok(RawGrid {
        headers,
        records: rows.collect(),
    })
}

fn render_spreadsheet_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(value) | Data::DateTimeIso(value) | Data::DurationIso(value) => {
            Some(value.clone())
        }
        Data::DateTime(stamp) => stamp
            .as_datetime()
            .map(|dt| dt.format(DATETIME_OUTPUT_FORMAT).to_string()),
        other => Some(other.to_string()),
    }
}

/// Accepts a top-level array of objects or one object per line.
pub fn parse_json(bytes: &[u8]) -> Result<RawGrid, FileParseError> {
    let text = io_utils::decode_bytes(bytes, UTF_8, "JSON")?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        if text.trim_start().starts_with('[') {
            serde_json::from_str(&text)?
        } else {
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<_, _>>()?
        };

    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for object in &objects {
        for key in object.keys() {
            if seen.insert(key.as_str()) {
                headers.push(key.clone());
            }
        }
    }
    let records = objects
        .iter()
        .map(|object| {
            headers
                .iter()
                .map(|key| match object.get(key) {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(value)) => Some(value.clone()),
                    Some(other) => Some(other.to_string()),
                })
                .collect()
        })
        .collect();
    Ok(RawGrid { headers, records })
}
