mod cli;
mod config;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use fuzzdex_core::{
    record_path, search, AppendLog, ErrorRate, Fingerprint, Indexer, SearchOptions,
    SignatureTable,
};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ToleranceArgs};
use crate::config::{config_path, load_config, parse_compression, parse_mode, AppConfig};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config_path = config_path(cli.config.clone());
    let mut config = load_config(&config_path)?;
    if let Some(log) = cli.log {
        config.storage.log_path = log;
    }
    debug!(config = %config_path.display(), log = %config.storage.log_path.display(), "configuration loaded");

    match cli.command {
        Commands::Index {
            files,
            store,
            compression,
            threads,
            mode,
        } => {
            if store {
                config.storage.store_content = true;
            }
            if let Some(compression) = compression {
                config.storage.compression = parse_compression(&compression)?;
            }
            if let Some(mode) = mode {
                config.fingerprint.mode = parse_mode(&mode)?;
            }
            if let Some(threads) = threads {
                config.general.thread_count_index = threads;
            }
            config.validate()?;
            run_index(&config, &files)
        }
        Commands::Search {
            files,
            tolerance,
            threads,
            json,
        } => {
            apply_tolerance(&mut config, &tolerance)?;
            if let Some(threads) = threads {
                config.general.thread_count_search = threads;
            }
            config.validate()?;
            run_search(&config, &files, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Similar { file, tolerance } => {
            apply_tolerance(&mut config, &tolerance)?;
            config.validate()?;
            run_similar(&config, &file)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn apply_tolerance(config: &mut AppConfig, tolerance: &ToleranceArgs) -> Result<()> {
    let rate = match (&tolerance.error_rate, tolerance.error_percent) {
        (Some(raw), _) => Some(
            raw.parse::<ErrorRate>()
                .with_context(|| format!("invalid --error-rate {raw}"))?,
        ),
        (None, Some(percent)) => Some(
            ErrorRate::from_percent(percent)
                .with_context(|| format!("invalid --error-percent {percent}"))?,
        ),
        (None, None) => None,
    };
    if let Some(rate) = rate {
        config.general.error_rate = rate.value();
    }
    Ok(())
}

fn run_index(config: &AppConfig, files: &[PathBuf]) -> Result<ExitCode> {
    let log = AppendLog::new(&config.storage.log_path);
    let fingerprinter = config.fingerprinter()?;
    let store = config.content_store();
    let mut indexer = Indexer::new(&log, &fingerprinter);
    if let Some(store) = store.as_ref() {
        indexer = indexer.with_store(store);
    }
    let outcomes = indexer.index_files(files, config.general.thread_count_index)?;

    let mut out = io::stdout().lock();
    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(indexed) => writeln!(
                out,
                "indexed {} {}",
                outcome.path.display(),
                indexed.fingerprint
            )?,
            Err(err) => {
                failed += 1;
                writeln!(out, "failed {}: {err}", outcome.path.display())?;
            }
        }
    }
    out.flush()?;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_search(config: &AppConfig, files: &[PathBuf], as_json: bool) -> Result<()> {
    let fingerprinter = config.fingerprinter()?;
    let queries: Vec<Fingerprint> = files
        .iter()
        .map(|path| {
            fingerprinter
                .fingerprint(path)
                .with_context(|| format!("failed to fingerprint query {}", path.display()))
        })
        .collect::<Result<_>>()?;

    let log = AppendLog::new(&config.storage.log_path);
    let options = SearchOptions::new(config.error_rate()?, config.general.thread_count_search)?;
    let mut stream = search(&log, queries, &options)
        .with_context(|| format!("failed to search {}", log.path().display()))?;

    let mut out = io::stdout().lock();
    for found in stream.by_ref() {
        let query = files[found.query].display();
        if as_json {
            let line = json!({ "query": query.to_string(), "match": found.path });
            writeln!(out, "{line}")?;
        } else {
            writeln!(out, "{query}\t{}", found.path)?;
        }
    }
    out.flush()?;
    stream
        .finish()
        .with_context(|| format!("search of {} failed", log.path().display()))?;
    Ok(())
}

fn run_similar(config: &AppConfig, file: &Path) -> Result<()> {
    let log = AppendLog::new(&config.storage.log_path);
    let table = SignatureTable::from_log(&log)
        .with_context(|| format!("failed to load {}", log.path().display()))?;
    let key = record_path(file)?;
    if table.get(&key).is_none() {
        info!(path = %key, "file is not in the log, fingerprinting it for this lookup");
        table.index_file(file, &config.fingerprinter()?)?;
    }
    let similar = table.find_similar(&key, config.general.error_rate)?;

    let mut out = io::stdout().lock();
    for path in &similar {
        writeln!(out, "{path}")?;
    }
    out.flush()?;
    Ok(())
}
