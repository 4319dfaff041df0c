//! Row classification against the table schema.
//!
//! Three independent passes run over the same rows:
//!
//! 1. [`check_required_columns`]: nulls in REQUIRED columns.
//! 2. [`check_key_uniqueness`]: rows sharing the same unique-key tuple.
//! 3. [`check_parsing`]: values that do not coerce to the column type.
//!
//! Passes never short-circuit each other; [`classify`] concatenates their
//! violations and a row is valid only when none of them names its index.

use std::fmt;

use itertools::Itertools;
use log::debug;

use crate::{
    data::classify_cell,
    schema::{ColumnSpec, TableSchema},
    structure::{ParsedTable, RawRow},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReasonCode {
    NullValueNotExpected,
    KeyNotUnique,
    ColumnNotParsable,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 3] = [
        ReasonCode::NullValueNotExpected,
        ReasonCode::KeyNotUnique,
        ReasonCode::ColumnNotParsable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::NullValueNotExpected => "NULL_VALUE_NOT_EXPECTED",
            ReasonCode::KeyNotUnique => "KEY_NOT_UNIQUE",
            ReasonCode::ColumnNotParsable => "COLUMN_NOT_PARSABLE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub row_index: usize,
    pub code: ReasonCode,
    /// Offending column, or the rendered key-column list for KEY_NOT_UNIQUE.
    pub column: String,
    /// Raw offending value; `None` when the cell was null.
    pub value: Option<String>,
    pub reason: String,
}

pub fn classify(table: &ParsedTable, schema: &TableSchema) -> Vec<Violation> {
    let required = check_required_columns(table, schema);
    let keys = check_key_uniqueness(table, schema);
    let parsing = check_parsing(table, schema);
    debug!(
        "{}: {} null, {} duplicate-key, {} unparsable violation(s)",
        table.source_filename,
        required.len(),
        keys.len(),
        parsing.len()
    );
    let mut violations = required;
    violations.extend(keys);
    violations.extend(parsing);
    violations
}

pub fn check_required_columns(table: &ParsedTable, schema: &TableSchema) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (position, column) in schema.required_columns() {
        for row in &table.rows {
            let raw = row.value(position);
            if raw.is_none() {
                violations.push(Violation {
                    row_index: row.index,
                    code: ReasonCode::NullValueNotExpected,
                    column: column.name.clone(),
                    value: None,
                    reason: format!("{} is NULL whereas it is REQUIRED", column.name),
                });
            }
        }
    }
    violations
}

pub fn check_key_uniqueness(table: &ParsedTable, schema: &TableSchema) -> Vec<Violation> {
    if !schema.has_key() {
        return Vec::new();
    }
    let key_positions: Vec<usize> = schema.key_columns().map(|(position, _)| position).collect();
    let key_of = |row: &RawRow| -> Vec<Option<String>> {
        key_positions
            .iter()
            .map(|&position| row.value(position).map(str::to_string))
            .collect()
    };
    let occurrences = table.rows.iter().map(key_of).counts();

    let key_label = render_key_columns(schema.key_columns().map(|(_, column)| column));
    table
        .rows
        .iter()
        .filter_map(|row| {
            let key = key_of(row);
            let count = occurrences.get(&key).copied().unwrap_or_default();
            (count > 1).then(|| Violation {
                row_index: row.index,
                code: ReasonCode::KeyNotUnique,
                column: key_label.clone(),
                value: Some(render_key_value(&key)),
                reason: format!("{key_label} is not unique : {count} occurences"),
            })
        })
        .collect()
}

pub fn check_parsing(table: &ParsedTable, schema: &TableSchema) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (position, column) in schema.file_columns() {
        for row in &table.rows {
            let raw = row.value(position);
            if classify_cell(raw, column).is_unparsable() {
                violations.push(Violation {
                    row_index: row.index,
                    code: ReasonCode::ColumnNotParsable,
                    column: column.name.clone(),
                    value: raw.map(str::to_string),
                    reason: format!("{} is not parsable to {}", column.name, column.datatype),
                });
            }
        }
    }
    violations
}

/// Renders key columns as `['a', 'b']`.
pub fn render_key_columns<'a>(columns: impl Iterator<Item = &'a ColumnSpec>) -> String {
    format!("['{}']", columns.map(|column| column.name.as_str()).join("', '"))
}

/// Renders a key tuple as `['1','x']`; null parts render as `nan`.
pub fn render_key_value(key: &[Option<String>]) -> String {
    format!(
        "['{}']",
        key.iter().map(|part| part.as_deref().unwrap_or("nan")).join("','")
    )
}
