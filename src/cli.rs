use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_PIPELINE;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Validate landing files against table schemas",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate every requested table of a pipeline configuration
    Run(RunArgs),
    /// Validate an explicit list of files against one table definition
    Check(CheckArgs),
    /// List the columns declared in a table definition
    Columns(ColumnsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Root directory holding the landing files
    #[arg(short, long)]
    pub landing: PathBuf,
    /// Directory receiving the output datasets
    #[arg(short, long)]
    pub output: PathBuf,
    /// Ingestion timestamp (YYYY-MM-DDTHH:MM:SS); defaults to now (UTC)
    #[arg(long = "ingestion-ts", value_parser = parse_ingestion_ts)]
    pub ingestion_ts: Option<NaiveDateTime>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Table definition file (JSON or YAML)
    #[arg(short, long)]
    pub params: PathBuf,
    /// Landing files to validate
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// Directory receiving the output datasets
    #[arg(short, long)]
    pub output: PathBuf,
    /// Pipeline name stamped on output records
    #[arg(long, default_value = DEFAULT_PIPELINE)]
    pub pipeline: String,
    /// Destination dataset stamped on output records
    #[arg(long, default_value = "raw")]
    pub dataset: String,
    /// Destination table (defaults to the definition file stem)
    #[arg(long)]
    pub table: Option<String>,
    /// Ingestion timestamp (YYYY-MM-DDTHH:MM:SS); defaults to now (UTC)
    #[arg(long = "ingestion-ts", value_parser = parse_ingestion_ts)]
    pub ingestion_ts: Option<NaiveDateTime>,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Table definition file (JSON or YAML)
    #[arg(short, long)]
    pub params: PathBuf,
}

/// Accepts `YYYY-MM-DDTHH:MM:SS` followed by anything (fractional seconds,
/// offsets), or the space-separated form.
pub fn parse_ingestion_ts(value: &str) -> Result<NaiveDateTime, String> {
    let head = value.trim().get(..19).unwrap_or(value.trim());
    NaiveDateTime::parse_from_str(head, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| format!("Invalid ingestion timestamp '{value}', expected YYYY-MM-DDTHH:MM:SS"))
}
