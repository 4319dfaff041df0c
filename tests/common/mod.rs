#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Fixed ingestion timestamp shared by the integration tests.
pub fn ingestion_ts() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 4, 2)
        .expect("valid date")
        .and_hms_opt(9, 15, 0)
        .expect("valid time")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` under the workspace, creating parent directories.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directories");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Reads a `;`-separated output dataset into its header and records.
    pub fn read_dataset(&self, name: &str) -> (Vec<String>, Vec<Vec<String>>) {
        read_dataset(&self.temp_dir.path().join(name))
    }
}

pub fn read_dataset(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .from_path(path)
        .unwrap_or_else(|err| panic!("open dataset {path:?}: {err}"));
    let headers = reader
        .headers()
        .expect("dataset header")
        .iter()
        .map(str::to_string)
        .collect();
    let records = reader
        .records()
        .map(|record| {
            record
                .expect("dataset record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (headers, records)
}
