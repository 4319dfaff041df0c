//! Error taxonomy for the validation engine.
//!
//! - [`SchemaError`]: the table definition itself is unusable. Fatal for the
//!   table run; no file is processed.
//! - [`FileParseError`]: one file could not be fetched or parsed. The batch
//!   runner records it in the file stats and moves on to the next file.
//!
//! Row-level failures are not errors at all; they are
//! [`Violation`](crate::classify::Violation)s produced by the classifier.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema must declare at least one column")]
    Empty,

    #[error("Column '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("Expected file column '{0}' is declared more than once")]
    DuplicateExpectedName(String),

    #[error("Column '{column}' of type {datatype} requires a date_format")]
    MissingDateFormat { column: String, datatype: String },

    #[error("Column '{column}' uses '{separator}' as both thousand and decimal separator")]
    AmbiguousSeparators { column: String, separator: char },

    #[error("Unknown column type '{0}'. Supported types: STRING, INTEGER, FLOAT, DATE, DATETIME")]
    UnknownType(String),

    #[error("Unknown column mode '{0}'. Supported modes: REQUIRED, NULLABLE, REPEATED")]
    UnknownMode(String),

    #[error("Invalid spreadsheet column selection '{0}'")]
    InvalidColumnSelection(String),

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Invalid CSV separator '{value}': {reason}")]
    InvalidDelimiter { value: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FileParseError {
    #[error("Error when fetching the file : {0}")]
    Fetch(String),

    #[error("Error when reading the {format} file : {message}")]
    Decode {
        format: &'static str,
        message: String,
    },

    #[error("Error when reading the CSV file : {0}")]
    Csv(#[from] csv::Error),

    #[error(
        "Error when reading the CSV file : Expected {expected} fields in line {line}, saw {found}"
    )]
    CsvWidth {
        expected: usize,
        found: usize,
        line: u64,
    },

    #[error("Error when reading the Excel file : {0}")]
    Spreadsheet(String),

    #[error("Error when reading the JSON file : {0}")]
    Json(String),

    #[error("Unsupported file format '{0}'")]
    UnsupportedFormat(String),
}

impl From<calamine::Error> for FileParseError {
    fn from(err: calamine::Error) -> Self {
        FileParseError::Spreadsheet(err.to_string())
    }
}

impl From<serde_json::Error> for FileParseError {
    fn from(err: serde_json::Error) -> Self {
        FileParseError::Json(err.to_string())
    }
}
