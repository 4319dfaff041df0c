//! Table schema model and per-table parameters.
//!
//! A table is described by a parameters document (JSON or YAML) holding the
//! landing `source_path`, the ordered `schema` column list and the
//! format-specific parsing hints under `file_info.format`. Everything is
//! validated once, at load time, into immutable structures:
//!
//! - [`TableSchema`]: ordered [`ColumnSpec`]s plus the derived required/key
//!   column positions the classifier needs.
//! - [`TableParams`]: the schema together with resolved [`CsvHints`] and
//!   [`SpreadsheetHints`].
//!
//! Columns named `source_filename` or `execution_datetime` are synthetic:
//! they never appear in a landing file and are filled by the runner.

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::BufReader,
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{error::SchemaError, io_utils};

pub const SOURCE_FILENAME_COLUMN: &str = "source_filename";
pub const EXECUTION_DATETIME_COLUMN: &str = "execution_datetime";
const SYNTHETIC_COLUMNS: &[&str] = &[SOURCE_FILENAME_COLUMN, EXECUTION_DATETIME_COLUMN];

/// Tokens read as null in delimited and spreadsheet cells unless a table
/// overrides them with `null_values`.
pub const DEFAULT_NULL_TOKENS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(ColumnType::String),
            "INTEGER" | "INT64" => Ok(ColumnType::Integer),
            "FLOAT" | "FLOAT64" => Ok(ColumnType::Float),
            "DATE" => Ok(ColumnType::Date),
            "DATETIME" => Ok(ColumnType::DateTime),
            _ => Err(SchemaError::UnknownType(value.to_string())),
        }
    }
}

impl Serialize for ColumnType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnType::from_str(&token).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnMode {
    Required,
    #[default]
    Nullable,
    Repeated,
}

impl ColumnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnMode::Required => "REQUIRED",
            ColumnMode::Nullable => "NULLABLE",
            ColumnMode::Repeated => "REPEATED",
        }
    }
}

impl fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnMode {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REQUIRED" => Ok(ColumnMode::Required),
            "NULLABLE" => Ok(ColumnMode::Nullable),
            "REPEATED" => Ok(ColumnMode::Repeated),
            _ => Err(SchemaError::UnknownMode(value.to_string())),
        }
    }
}

impl Serialize for ColumnMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ColumnMode::from_str(&token).map_err(de::Error::custom)
    }
}

/// Separators may be given as `null`, an empty string, or one character.
fn deserialize_separator<'de, D>(deserializer: D) -> Result<Option<char>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(ch), None) => Ok(Some(ch)),
        _ => Err(de::Error::custom(format!(
            "separator '{raw}' must be a single character"
        ))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_file_name: Option<String>,
    #[serde(rename = "type")]
    pub datatype: ColumnType,
    #[serde(default)]
    pub mode: ColumnMode,
    #[serde(
        default,
        rename = "unique_identifier",
        alias = "key",
        alias = "is_unique_key"
    )]
    pub is_unique_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_separator",
        skip_serializing_if = "Option::is_none"
    )]
    pub float_thousand_separator: Option<char>,
    #[serde(
        default,
        deserialize_with = "deserialize_separator",
        skip_serializing_if = "Option::is_none"
    )]
    pub float_decimal_separator: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str, datatype: ColumnType) -> Self {
        ColumnSpec {
            name: name.to_string(),
            expected_file_name: None,
            datatype,
            mode: ColumnMode::Nullable,
            is_unique_key: false,
            date_format: None,
            float_thousand_separator: None,
            float_decimal_separator: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = ColumnMode::Required;
        self
    }

    pub fn unique_key(mut self) -> Self {
        self.is_unique_key = true;
        self
    }

    pub fn with_date_format(mut self, format: &str) -> Self {
        self.date_format = Some(format.to_string());
        self
    }

    pub fn with_separators(mut self, thousand: Option<char>, decimal: Option<char>) -> Self {
        self.float_thousand_separator = thousand;
        self.float_decimal_separator = decimal;
        self
    }

    pub fn with_expected_file_name(mut self, name: &str) -> Self {
        self.expected_file_name = Some(name.to_string());
        self
    }

    /// Header label this column carries in a landing file.
    pub fn expected_name(&self) -> &str {
        self.expected_file_name
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn is_required(&self) -> bool {
        self.mode == ColumnMode::Required
    }

    pub fn is_synthetic(&self) -> bool {
        SYNTHETIC_COLUMNS.contains(&self.name.as_str())
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.datatype.is_temporal()
            && self
                .date_format
                .as_deref()
                .is_none_or(|format| format.trim().is_empty())
        {
            return Err(SchemaError::MissingDateFormat {
                column: self.name.clone(),
                datatype: self.datatype.to_string(),
            });
        }
        if let (Some(thousand), Some(decimal)) =
            (self.float_thousand_separator, self.float_decimal_separator)
            && thousand == decimal
        {
            return Err(SchemaError::AmbiguousSeparators {
                column: self.name.clone(),
                separator: thousand,
            });
        }
        Ok(())
    }
}

/// Validated, ordered column list.
///
/// Row values handed to the classifier are positional over the file-facing
/// columns only, so `required` and `keys` hold positions into that subset.
#[derive(Debug, Clone)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
    file_columns: Vec<usize>,
    required: Vec<usize>,
    keys: Vec<usize>,
}

impl TableSchema {
    pub fn load(columns: Vec<ColumnSpec>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut names = HashSet::new();
        let mut expected_names = HashSet::new();
        let mut file_columns = Vec::new();
        let mut required = Vec::new();
        let mut keys = Vec::new();

        for (idx, column) in columns.iter().enumerate() {
            if !names.insert(column.name.as_str()) {
                return Err(SchemaError::DuplicateName(column.name.clone()));
            }
            if column.is_synthetic() {
                continue;
            }
            column.validate()?;
            if !expected_names.insert(column.expected_name()) {
                return Err(SchemaError::DuplicateExpectedName(
                    column.expected_name().to_string(),
                ));
            }
            let position = file_columns.len();
            file_columns.push(idx);
            if column.is_required() {
                required.push(position);
            }
            if column.is_unique_key {
                keys.push(position);
            }
        }

        Ok(TableSchema {
            columns,
            file_columns,
            required,
            keys,
        })
    }

    /// Every declared column, synthetic ones included, in declared order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// File-facing columns in declared order. The position yielded is the
    /// value's position inside a parsed row.
    pub fn file_columns(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.file_columns
            .iter()
            .enumerate()
            .map(|(position, &idx)| (position, &self.columns[idx]))
    }

    pub fn file_column(&self, position: usize) -> Option<&ColumnSpec> {
        self.file_columns
            .get(position)
            .map(|&idx| &self.columns[idx])
    }

    pub fn required_columns(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.required
            .iter()
            .map(|&position| (position, &self.columns[self.file_columns[position]]))
    }

    pub fn key_columns(&self) -> impl Iterator<Item = (usize, &ColumnSpec)> {
        self.keys
            .iter()
            .map(|&position| (position, &self.columns[self.file_columns[position]]))
    }

    pub fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Header a conforming landing file must carry, in order.
    pub fn column_names_in_order(&self) -> Vec<&str> {
        self.file_columns()
            .map(|(_, column)| column.expected_name())
            .collect()
    }

    /// Canonical names of every declared column, used as the valid-rows header.
    pub fn output_headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsvFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpreadsheetFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_columns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_from_rows: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFormats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<CsvFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xlsx: Option<SpreadsheetFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xlsm: Option<SpreadsheetFormat>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub format: FileFormats,
}

/// Raw table parameters document, as written by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(default)]
    pub source_path: String,
    pub schema: Vec<ColumnSpec>,
    #[serde(default)]
    pub file_info: FileInfo,
}

#[derive(Debug, Clone)]
pub struct CsvHints {
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub null_values: Vec<String>,
}

impl Default for CsvHints {
    fn default() -> Self {
        CsvHints {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            encoding: encoding_rs::UTF_8,
            null_values: default_null_values(),
        }
    }
}

impl CsvHints {
    fn resolve(format: Option<&CsvFormat>) -> Result<Self, SchemaError> {
        let Some(format) = format else {
            return Ok(CsvHints::default());
        };
        let delimiter = match format.separator.as_deref() {
            Some(value) => {
                io_utils::parse_delimiter(value).map_err(|reason| SchemaError::InvalidDelimiter {
                    value: value.to_string(),
                    reason,
                })?
            }
            None => io_utils::DEFAULT_CSV_DELIMITER,
        };
        let encoding = io_utils::resolve_encoding(format.encoding.as_deref())?;
        let null_values = format
            .null_values
            .clone()
            .unwrap_or_else(default_null_values);
        Ok(CsvHints {
            delimiter,
            encoding,
            null_values,
        })
    }

    pub fn is_null(&self, value: &str) -> bool {
        value.is_empty() || self.null_values.iter().any(|token| token == value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpreadsheetHints {
    pub sheet_name: Option<String>,
    /// Zero-based sheet column indices to keep; `None` keeps every column.
    pub columns: Option<Vec<u32>>,
    /// Sheet rows skipped before the header row.
    pub skip_rows: u32,
}

impl SpreadsheetHints {
    fn resolve(format: Option<&SpreadsheetFormat>) -> Result<Self, SchemaError> {
        let Some(format) = format else {
            return Ok(SpreadsheetHints::default());
        };
        let columns = format
            .data_columns
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(parse_column_selection)
            .transpose()?;
        Ok(SpreadsheetHints {
            sheet_name: format.sheet_name.clone(),
            columns,
            skip_rows: format.data_from_rows.unwrap_or(0),
        })
    }
}

fn default_null_values() -> Vec<String> {
    DEFAULT_NULL_TOKENS.iter().map(|t| t.to_string()).collect()
}

/// Converts a spreadsheet column letter (`A`, `AB`) into a zero-based index.
pub fn column_letter_index(letters: &str) -> Option<u32> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut index: u32 = 0;
    for ch in letters.chars() {
        let digit = (ch.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Parses selections such as `A:D` or `A,C,E:G` into sheet column indices.
pub fn parse_column_selection(value: &str) -> Result<Vec<u32>, SchemaError> {
    let invalid = || SchemaError::InvalidColumnSelection(value.to_string());
    let mut columns = Vec::new();
    for part in value.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once(':') {
            Some((start, end)) => {
                let start = column_letter_index(start).ok_or_else(invalid)?;
                let end = column_letter_index(end).ok_or_else(invalid)?;
                if end < start {
                    return Err(invalid());
                }
                columns.extend(start..=end);
            }
            None => columns.push(column_letter_index(part).ok_or_else(invalid)?),
        }
    }
    if columns.is_empty() {
        return Err(invalid());
    }
    Ok(columns)
}

/// A table definition validated into the structures the engine consumes.
#[derive(Debug, Clone)]
pub struct TableParams {
    pub source_path: String,
    pub schema: TableSchema,
    pub csv: CsvHints,
    pub xlsx: SpreadsheetHints,
    pub xlsm: SpreadsheetHints,
}

impl TableParams {
    pub fn from_definition(definition: TableDefinition) -> Result<Self, SchemaError> {
        let formats = &definition.file_info.format;
        let csv = CsvHints::resolve(formats.csv.as_ref())?;
        let xlsx = SpreadsheetHints::resolve(formats.xlsx.as_ref())?;
        let xlsm = SpreadsheetHints::resolve(formats.xlsm.as_ref())?;
        let schema = TableSchema::load(definition.schema)?;
        Ok(TableParams {
            source_path: definition.source_path,
            schema,
            csv,
            xlsx,
            xlsm,
        })
    }

    /// Loads a table parameters file. `.json` files go through `serde_json`,
    /// anything else through the YAML parser.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening table parameters {path:?}"))?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let definition: TableDefinition = if is_json {
            serde_json::from_reader(reader).context("Parsing table parameters JSON")?
        } else {
            serde_yaml::from_reader(reader).context("Parsing table parameters YAML")?
        };
        let params = TableParams::from_definition(definition)
            .with_context(|| format!("Validating table parameters {path:?}"))?;
        Ok(params)
    }
}
