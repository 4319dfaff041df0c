//! Pipeline configuration.
//!
//! A pipeline file lists the tables to validate in one run, in order, and the
//! names of the data-quality datasets:
//!
//! ```yaml
//! pipeline: 0_landing_to_raw
//! tables:
//!   sales:
//!     to_request: true
//!     source_file_params: params/sales.json
//!     destination_dataset: raw
//!     write_mode: APPEND
//! data_quality:
//!   output_path: dq
//! ```

use std::{
    fmt,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor},
};

use crate::output::OutputNames;

pub const DEFAULT_PIPELINE: &str = "0_landing_to_raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMode {
    #[default]
    Append,
    Truncate,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableEntry {
    /// Key of the entry under `tables`.
    #[serde(skip)]
    pub key: String,
    #[serde(default = "default_to_request")]
    pub to_request: bool,
    pub source_file_params: PathBuf,
    pub destination_dataset: String,
    #[serde(default)]
    pub destination_table: Option<String>,
    #[serde(default)]
    pub write_mode: WriteMode,
}

impl TableEntry {
    pub fn table_name(&self) -> &str {
        self.destination_table.as_deref().unwrap_or(&self.key)
    }
}

fn default_to_request() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DataQualityConfig {
    pub output_path: String,
    pub file_stats_filename: String,
    pub rows_stats_filename: String,
    pub data_invalid_filename: String,
    pub data_valid_filename: String,
}

impl Default for DataQualityConfig {
    fn default() -> Self {
        let names = OutputNames::default();
        DataQualityConfig {
            output_path: "dq".to_string(),
            file_stats_filename: names.file_stats,
            rows_stats_filename: names.row_stats,
            data_invalid_filename: names.invalid_rows,
            data_valid_filename: names.valid_rows,
        }
    }
}

impl DataQualityConfig {
    pub fn output_names(&self) -> OutputNames {
        OutputNames {
            file_stats: self.file_stats_filename.clone(),
            row_stats: self.rows_stats_filename.clone(),
            invalid_rows: self.data_invalid_filename.clone(),
            valid_rows: self.data_valid_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_pipeline")]
    pub pipeline: String,
    #[serde(deserialize_with = "deserialize_tables")]
    pub tables: Vec<TableEntry>,
    #[serde(default)]
    pub data_quality: DataQualityConfig,
}

fn default_pipeline() -> String {
    DEFAULT_PIPELINE.to_string()
}

/// Keeps the `tables` mapping in file order and stamps each entry with its key.
fn deserialize_tables<'de, D>(deserializer: D) -> Result<Vec<TableEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TablesVisitor;

    impl<'de> Visitor<'de> for TablesVisitor {
        type Value = Vec<TableEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of table names to table settings")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tables = Vec::new();
            while let Some((key, mut entry)) = map.next_entry::<String, TableEntry>()? {
                entry.key = key;
                tables.push(entry);
            }
            Ok(tables)
        }
    }

    deserializer.deserialize_map(TablesVisitor)
}

impl PipelineConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(raw).context("Parsing pipeline configuration YAML")?;
        Ok(config)
    }

    /// Loads a pipeline file; relative `source_file_params` paths are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening pipeline configuration {path:?}"))?;
        let mut config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing pipeline configuration {path:?}"))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for table in &mut config.tables {
            if table.source_file_params.is_relative() {
                table.source_file_params = base.join(&table.source_file_params);
            }
        }
        Ok(config)
    }

    pub fn requested_tables(&self) -> impl Iterator<Item = &TableEntry> {
        self.tables.iter().filter(|table| table.to_request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const PIPELINE: &str = "\
tables:
  zeta:
    source_file_params: params/zeta.json
    destination_dataset: raw
  alpha:
    to_request: false
    source_file_params: /abs/alpha.yml
    destination_dataset: raw
    destination_table: alpha_v2
    write_mode: TRUNCATE
data_quality:
  output_path: quality
";

    #[test]
    fn tables_keep_file_order_and_defaults() {
        let config = PipelineConfig::from_yaml_str(PIPELINE).expect("config parses");
        assert_eq!(config.pipeline, DEFAULT_PIPELINE);
        let keys: Vec<_> = config.tables.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert!(config.tables[0].to_request);
        assert_eq!(config.tables[0].write_mode, WriteMode::Append);
        assert_eq!(config.tables[0].table_name(), "zeta");
        assert_eq!(config.tables[1].table_name(), "alpha_v2");
        assert_eq!(config.tables[1].write_mode, WriteMode::Truncate);
        assert_eq!(config.requested_tables().count(), 1);

        let names = config.data_quality.output_names();
        assert_eq!(config.data_quality.output_path, "quality");
        assert_eq!(names, OutputNames::default());
    }

    #[test]
    fn load_resolves_relative_params_against_config_dir() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("pipeline.yml");
        fs::write(&path, PIPELINE).unwrap();
        let config = PipelineConfig::load(&path).expect("config loads");
        assert_eq!(
            config.tables[0].source_file_params,
            dir.path().join("params/zeta.json")
        );
        assert_eq!(
            config.tables[1].source_file_params,
            PathBuf::from("/abs/alpha.yml")
        );
    }

    #[test]
    fn unknown_write_mode_is_rejected() {
        let raw = "tables:\n  t:\n    source_file_params: p.json\n    destination_dataset: raw\n    write_mode: MERGE\n";
        assert!(PipelineConfig::from_yaml_str(raw).is_err());
    }
}
