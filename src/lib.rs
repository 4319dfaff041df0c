pub mod batch;
pub mod classify;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod output;
pub mod partition;
pub mod schema;
pub mod source;
pub mod structure;
pub mod table;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use chrono::{NaiveDateTime, Timelike, Utc};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    batch::{BatchOutputs, RunContext, run_batch},
    cli::{CheckArgs, Cli, ColumnsArgs, Commands, RunArgs},
    config::{PipelineConfig, TableEntry},
    output::{OutputNames, write_outputs},
    schema::TableParams,
    source::{LocalFile, list_landing_files},
    table::TextTable,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("landing_quality", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Check(args) => handle_check(&args),
        Commands::Columns(args) => handle_columns(&args),
    }
}

fn handle_run(args: &RunArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Loading pipeline configuration {:?}", args.config))?;
    let ingested_at = args.ingestion_ts.unwrap_or_else(ingestion_now);
    let names = config.data_quality.output_names();
    info!(
        "Running pipeline '{}' over {} table(s) at {}",
        config.pipeline,
        config.tables.len(),
        ingested_at
    );

    let mut summary = TextTable::new([
        "table",
        "files",
        "invalid files",
        "valid rows",
        "invalid rows",
    ]);
    for entry in config.tables.iter().filter(|entry| !entry.to_request) {
        warn!("Skipping table '{}': to_request is false", entry.key);
    }
    let mut failed = Vec::new();
    for entry in config.requested_tables() {
        let context = RunContext::new(
            config.pipeline.as_str(),
            entry.destination_dataset.as_str(),
            entry.table_name(),
            ingested_at,
        );
        match run_table(entry, &config, args, &names, &context) {
            Ok(outputs) => summary.push_row([
                entry.key.clone(),
                outputs.file_stats.len().to_string(),
                outputs.invalid_file_count().to_string(),
                outputs.valid_rows.len().to_string(),
                outputs.invalid_rows.len().to_string(),
            ]),
            Err(err) => {
                warn!("Table '{}' was not validated: {err:#}", entry.key);
                failed.push(entry.key.clone());
            }
        }
    }

    if !summary.is_empty() {
        summary.print();
    }
    if !failed.is_empty() {
        bail!(
            "{} table(s) could not be validated: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

fn run_table(
    entry: &TableEntry,
    config: &PipelineConfig,
    args: &RunArgs,
    names: &OutputNames,
    context: &RunContext,
) -> Result<BatchOutputs> {
    let params = TableParams::load(&entry.source_file_params)?;
    let files = list_landing_files(&args.landing, &params.source_path)?;
    info!(
        "Table '{}': {} file(s) found under '{}'",
        entry.key,
        files.len(),
        params.source_path
    );
    let outputs = run_batch(files, &params, context);
    let dir = args
        .output
        .join(&config.data_quality.output_path)
        .join(&entry.key);
    write_outputs(&dir, names, &outputs, &params.schema, context)?;
    Ok(outputs)
}

fn handle_check(args: &CheckArgs) -> Result<()> {
    let params = TableParams::load(&args.params)?;
    let table_name = match &args.table {
        Some(name) => name.clone(),
        None => file_stem(&args.params)?,
    };
    let context = RunContext::new(
        args.pipeline.as_str(),
        args.dataset.as_str(),
        table_name,
        args.ingestion_ts.unwrap_or_else(ingestion_now),
    );
    let files = args
        .inputs
        .iter()
        .map(|path| LocalFile::from_path(path))
        .collect::<Result<Vec<_>>>()?;
    debug!("Checking {} file(s) for table '{}'", files.len(), context.table);
    let outputs = run_batch(files, &params, &context);
    write_outputs(
        &args.output,
        &OutputNames::default(),
        &outputs,
        &params.schema,
        &context,
    )?;
    table::batch_summary(&outputs).print();
    Ok(())
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let params = TableParams::load(&args.params)?;
    table::schema_table(&params.schema).print();
    info!(
        "Listed {} column(s) from {:?}",
        params.schema.columns().len(),
        args.params
    );
    Ok(())
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("Deriving a table name from {path:?}"))
}

fn ingestion_now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
