//! Batch runner: structural check, classification and partitioning of every
//! file in a batch, accumulated into the four output datasets.

use chrono::NaiveDateTime;
use log::{info, warn};
use serde::Serialize;

use crate::{
    classify::classify,
    data::DATETIME_OUTPUT_FORMAT,
    partition::{InvalidRow, Partition, RowStats, ValidRow, invalid_order, partition, valid_order},
    schema::TableParams,
    source::RawFile,
    structure::{self, FileCheck},
};

/// Attribution stamped on every output record of a table run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub pipeline: String,
    pub dataset: String,
    pub table: String,
    pub ingested_at: NaiveDateTime,
}

impl RunContext {
    pub fn new(
        pipeline: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
        ingested_at: NaiveDateTime,
    ) -> Self {
        RunContext {
            pipeline: pipeline.into(),
            dataset: dataset.into(),
            table: table.into(),
            ingested_at,
        }
    }

    pub fn date_ingest(&self) -> String {
        self.ingested_at.format(DATETIME_OUTPUT_FORMAT).to_string()
    }

    pub fn file_stats(&self, source_filename: &str, is_invalid: bool, description: String) -> FileStats {
        FileStats {
            pipeline: self.pipeline.clone(),
            dataset: self.dataset.clone(),
            table: self.table.clone(),
            source_filename: source_filename.to_string(),
            date_ingest: self.date_ingest(),
            is_invalid,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub pipeline: String,
    pub dataset: String,
    pub table: String,
    pub source_filename: String,
    pub date_ingest: String,
    pub is_invalid: bool,
    pub description: String,
}

impl FileStats {
    pub const HEADERS: [&'static str; 7] = [
        "pipeline",
        "dataset",
        "table",
        "source_filename",
        "date_ingest",
        "is_invalid",
        "description",
    ];
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutputs {
    pub file_stats: Vec<FileStats>,
    pub row_stats: Vec<RowStats>,
    pub valid_rows: Vec<ValidRow>,
    pub invalid_rows: Vec<InvalidRow>,
}

impl BatchOutputs {
    pub fn absorb(&mut self, part: Partition) {
        self.row_stats.push(part.row_stats);
        self.valid_rows.extend(part.valid_rows);
        self.invalid_rows.extend(part.invalid_rows);
    }

    /// Restores the deterministic dataset order after per-file accumulation.
    pub fn finalize(&mut self) {
        self.file_stats
            .sort_by(|a, b| a.source_filename.cmp(&b.source_filename));
        self.row_stats
            .sort_by(|a, b| a.source_filename.cmp(&b.source_filename));
        self.valid_rows
            .sort_by(|a, b| valid_order(a).cmp(&valid_order(b)));
        self.invalid_rows
            .sort_by(|a, b| invalid_order(a).cmp(&invalid_order(b)));
    }

    pub fn invalid_file_count(&self) -> usize {
        self.file_stats.iter().filter(|s| s.is_invalid).count()
    }
}

/// Runs the structural check and, when it passes, the row checks for one
/// file's bytes.
pub fn process_file(
    name: &str,
    bytes: &[u8],
    params: &TableParams,
    context: &RunContext,
) -> (FileStats, Option<Partition>) {
    let FileCheck {
        table,
        stats,
        is_valid,
    } = structure::check(name, bytes, params, context);
    let Some(table) = table.filter(|_| is_valid) else {
        return (stats, None);
    };
    let violations = classify(&table, &params.schema);
    let part = partition(&table, &params.schema, &violations, context);
    info!(
        "{name}: {} valid line(s), {} invalid line(s)",
        part.row_stats.nb_valid_lines, part.row_stats.nb_invalid_lines
    );
    (stats, Some(part))
}

/// Processes every file of a batch. Empty files are skipped before any
/// check; a file that cannot be fetched or parsed is recorded in the file
/// stats and never stops the batch.
pub fn run_batch<I>(files: I, params: &TableParams, context: &RunContext) -> BatchOutputs
where
    I: IntoIterator,
    I::Item: RawFile,
{
    let mut outputs = BatchOutputs::default();
    for file in files {
        if file.size() == 0 {
            info!("Skipping empty file '{}'", file.name());
            continue;
        }
        info!("Analyzing '{}' ({} bytes)", file.name(), file.size());
        let bytes = match file.fetch() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Could not fetch '{}': {err}", file.name());
                outputs
                    .file_stats
                    .push(context.file_stats(file.name(), true, err.to_string()));
                continue;
            }
        };
        let (stats, part) = process_file(file.name(), &bytes, params, context);
        outputs.file_stats.push(stats);
        if let Some(part) = part {
            outputs.absorb(part);
        }
    }
    outputs.finalize();
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FileParseError,
        schema::{ColumnSpec, ColumnType, CsvHints, SpreadsheetHints, TableSchema},
        source::InMemoryFile,
        structure::COLUMNS_MISMATCH,
    };
    use chrono::NaiveDate;

    struct Unreachable;

    impl RawFile for Unreachable {
        fn name(&self) -> &str {
            "landing/gone.csv"
        }

        fn size(&self) -> u64 {
            12
        }

        fn fetch(&self) -> Result<Vec<u8>, FileParseError> {
            Err(FileParseError::Fetch("connection reset".to_string()))
        }
    }

    fn params() -> TableParams {
        let schema = TableSchema::load(vec![
            ColumnSpec::new("id", ColumnType::Integer)
                .required()
                .unique_key(),
            ColumnSpec::new("amount", ColumnType::Float).with_separators(None, Some(',')),
        ])
        .expect("schema");
        TableParams {
            source_path: "landing/".to_string(),
            schema,
            csv: CsvHints {
                delimiter: b';',
                ..CsvHints::default()
            },
            xlsx: SpreadsheetHints::default(),
            xlsm: SpreadsheetHints::default(),
        }
    }

    fn context() -> RunContext {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        RunContext::new("0_landing_to_raw", "raw", "payments", ts)
    }

    #[test]
    fn date_ingest_uses_space_separated_layout() {
        assert_eq!(context().date_ingest(), "2024-01-15 06:30:00");
    }

    #[test]
    fn empty_files_leave_no_trace() {
        let files = vec![InMemoryFile::new("landing/empty.csv", Vec::new())];
        let outputs = run_batch(files, &params(), &context());
        assert_eq!(outputs, BatchOutputs::default());
    }

    #[test]
    fn fetch_failure_is_recorded_and_batch_continues() {
        let outputs = run_batch([Unreachable], &params(), &context());
        assert_eq!(outputs.file_stats.len(), 1);
        let stats = &outputs.file_stats[0];
        assert!(stats.is_invalid);
        assert_eq!(
            stats.description,
            "Error when fetching the file : connection reset"
        );
        assert!(outputs.row_stats.is_empty());
    }

    #[test]
    fn mixed_batch_is_sorted_by_filename() {
        let files = vec![
            InMemoryFile::new("landing/b.csv", "id;amount\n3;1,5\n3;2\n"),
            InMemoryFile::new("landing/a.csv", "id;amount\n1;10,5\n2;x\n;4\n"),
            InMemoryFile::new("landing/c.csv", "amount;id\n1;1\n"),
        ];
        let outputs = run_batch(files, &params(), &context());

        let files: Vec<_> = outputs
            .file_stats
            .iter()
            .map(|s| (s.source_filename.as_str(), s.is_invalid))
            .collect();
        assert_eq!(
            files,
            vec![
                ("landing/a.csv", false),
                ("landing/b.csv", false),
                ("landing/c.csv", true),
            ]
        );
        assert_eq!(outputs.file_stats[2].description, COLUMNS_MISMATCH);
        assert_eq!(outputs.invalid_file_count(), 1);

        assert_eq!(outputs.row_stats.len(), 2);
        assert_eq!(outputs.row_stats[0].source_filename, "landing/a.csv");
        assert_eq!(outputs.row_stats[0].nb_valid_lines, 1);
        assert_eq!(outputs.row_stats[0].nb_invalid_lines, 2);
        assert_eq!(outputs.row_stats[1].nb_invalid_lines_key_not_unique, 2);

        let valid: Vec<_> = outputs
            .valid_rows
            .iter()
            .map(|r| (r.source_filename.as_str(), r.index))
            .collect();
        assert_eq!(valid, vec![("landing/a.csv", 0)]);

        let invalid: Vec<_> = outputs
            .invalid_rows
            .iter()
            .map(|r| (r.source_filename.as_str(), r.index, r.invalid_code.as_str()))
            .collect();
        assert_eq!(
            invalid,
            vec![
                ("landing/a.csv", 1, "COLUMN_NOT_PARSABLE"),
                ("landing/a.csv", 2, "NULL_VALUE_NOT_EXPECTED"),
                ("landing/b.csv", 0, "KEY_NOT_UNIQUE"),
                ("landing/b.csv", 1, "KEY_NOT_UNIQUE"),
            ]
        );
    }
}
