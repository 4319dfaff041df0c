//! Byte decoding, delimiter parsing and CSV reader/writer construction.
//!
//! Landing files arrive as fully materialised bytes, so readers are built
//! over in-memory slices after the bytes have been decoded with the table's
//! configured encoding. Output datasets are written with `;` as the field
//! separator and minimal quoting so warehouse load jobs can ingest them.

use std::{
    fs::{self, File},
    io::{BufWriter, Read},
    path::Path,
};

use anyhow::{Context, Result};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::{FileParseError, SchemaError};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const OUTPUT_DELIMITER: u8 = b';';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding, SchemaError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| SchemaError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Decodes `bytes` with `encoding`, honouring a leading BOM. `format` names
/// the file kind in the resulting error description.
pub fn decode_bytes(
    bytes: &[u8],
    encoding: &'static Encoding,
    format: &'static str,
) -> Result<String, FileParseError> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(FileParseError::Decode {
            format,
            message: format!("Failed to decode text with encoding {}", used.name()),
        })
    } else {
        Ok(text.into_owned())
    }
}

/// Records may be shorter than the header; width checks are left to the caller.
pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Creates `path` (and its parent directories) for a `;`-separated dataset.
/// Headers are written explicitly by the caller so empty datasets still get one.
pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
    }
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(OUTPUT_DELIMITER)
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(BufWriter::new(file)))
}
