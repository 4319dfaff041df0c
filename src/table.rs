//! Plain-text tables for CLI output.

use std::fmt::Write as _;

use crate::{batch::BatchOutputs, schema::TableSchema};

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TextTable {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = cells.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| width_of(h).max(3)).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(width_of(cell));
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", render_line(&self.headers, &widths));
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let _ = writeln!(output, "{}", render_line(&rule, &widths));
        for row in &self.rows {
            let _ = writeln!(output, "{}", render_line(row, &widths));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }
}

fn render_line(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let cell = flatten(cell);
            let padding = width.saturating_sub(width_of(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn width_of(value: &str) -> usize {
    value.chars().count()
}

fn flatten(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

/// One line per declared column: position, names, type, mode and key flag.
pub fn schema_table(schema: &TableSchema) -> TextTable {
    let mut table = TextTable::new(["#", "name", "file name", "type", "mode", "key"]);
    for (idx, column) in schema.columns().iter().enumerate() {
        let file_name = if column.is_synthetic() {
            "(generated)".to_string()
        } else {
            column.expected_name().to_string()
        };
        table.push_row([
            (idx + 1).to_string(),
            column.name.clone(),
            file_name,
            column.datatype.to_string(),
            column.mode.to_string(),
            if column.is_unique_key { "yes" } else { "" }.to_string(),
        ]);
    }
    table
}

/// One line per processed file with its verdict and row counts.
pub fn batch_summary(outputs: &BatchOutputs) -> TextTable {
    let mut table = TextTable::new(["file", "status", "valid", "invalid", "description"]);
    for stats in &outputs.file_stats {
        let rows = outputs
            .row_stats
            .iter()
            .find(|row| row.source_filename == stats.source_filename);
        let (valid, invalid) = rows.map_or((String::new(), String::new()), |row| {
            (row.nb_valid_lines.to_string(), row.nb_invalid_lines.to_string())
        });
        let status = if stats.is_invalid { "INVALID" } else { "VALID" };
        table.push_row([
            stats.source_filename.clone(),
            status.to_string(),
            valid,
            invalid,
            stats.description.clone(),
        ]);
    }
    table
}
