//! `e2p` command line front end.
//!
//! # Responsibility
//! - Run queries against the cached snapshot and print rendered results.
//! - Trigger refresh runs and report per-source outcomes.
//! - Host the JSON-lines tool loop.
//!
//! # Invariants
//! - stdout carries only user-visible output; diagnostics go to stderr and the log file.
//! - The query path never fetches.
//! - A refresh holds the cache lock from load to save.

use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use e2p_api::QueryTool;
use e2p_core::{
    init_logging, registry_from_config, render_help, render_results, run_query, AppConfig,
    CacheLock, CacheSnapshot, CacheStore, QueryParseError, RefreshOutcome, RefreshRequest,
    RefreshScheduler, SharedCache, Source, TagDescriptions,
};
use log::info;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "e2p")]
#[command(about = "Query and refresh a local cache of personal data sources", long_about = None)]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    /// Query such as `source:notes tag:work from:-7d`
    #[arg(value_name = "QUERY", allow_hyphen_values = true)]
    query: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh stale sources, or exactly the named ones
    Refresh {
        /// Sources to force-refresh (`notes`, `tasks`, `obsidian`, ...)
        #[arg(value_name = "SOURCE")]
        sources: Vec<String>,
    },
    /// Show item counts and freshness per source
    Status,
    /// Print the generated query language guide
    HelpText,
    /// Answer JSON tool requests from stdin, one per line
    Serve,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(&config.log_level, &config.log_dir) {
        eprintln!("warning: file logging disabled: {err}");
    }

    match cli.command {
        Some(Command::Refresh { sources }) => refresh(&config, &sources),
        Some(Command::Status) => status(&config),
        Some(Command::HelpText) => help_text(&config),
        Some(Command::Serve) => serve(&config),
        None => query(&config, &cli.query.join(" ")),
    }
}

fn query(config: &AppConfig, raw: &str) -> ExitCode {
    let snapshot = match CacheStore::new(&config.cache_path).load() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("hint: run `e2p refresh` to build the cache");
            return ExitCode::FAILURE;
        }
    };

    match run_query(&snapshot, raw, Local::now().naive_local()) {
        Ok(run) => {
            for warning in &run.warnings {
                eprintln!("warning: {warning}");
            }
            print!("{}", render_results(raw, &run.items));
            ExitCode::SUCCESS
        }
        Err(err @ QueryParseError::MalformedDate { .. }) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn refresh(config: &AppConfig, names: &[String]) -> ExitCode {
    let mut sources = Vec::new();
    for name in names {
        match Source::parse(name) {
            Some(source) => sources.push(source),
            None => eprintln!("warning: unknown source `{name}` ignored"),
        }
    }
    if !names.is_empty() && sources.is_empty() {
        eprintln!("error: no known source named");
        return ExitCode::from(2);
    }

    let registry = match registry_from_config(config) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _lock = match CacheLock::acquire(&config.lock_path, config.lock_timeout) {
        Ok(lock) => lock,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let store = CacheStore::new(&config.cache_path);
    let snapshot = match store.load_or_empty() {
        Ok(snapshot) => snapshot,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    let cache = Arc::new(SharedCache::new(snapshot));
    let scheduler = RefreshScheduler::new(registry, config.policy.clone(), Arc::clone(&cache))
        .with_store(store)
        .with_fetch_timeout(config.fetch_timeout);

    let report = scheduler.run(&RefreshRequest::from_sources(sources));
    for entry in &report.entries {
        match &entry.outcome {
            RefreshOutcome::Refreshed(update) => {
                println!("{:<9} refreshed ({} items)", entry.source.as_str(), update.count);
            }
            RefreshOutcome::Skipped => println!("{:<9} fresh, skipped", entry.source.as_str()),
            RefreshOutcome::Failed(err) => {
                println!("{:<9} failed: {}", entry.source.as_str(), err.message);
            }
        }
    }
    if report.entries.is_empty() {
        println!("no sources configured");
    }

    let unsaved = report.unsaved();
    for (source, err) in &unsaved {
        eprintln!("error: {source} refreshed but not written to the cache file: {err}");
    }
    if !unsaved.is_empty() || (report.all_failed() && cache.current().is_empty()) {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn load_lenient(config: &AppConfig) -> Result<CacheSnapshot, ExitCode> {
    CacheStore::new(&config.cache_path)
        .load_or_empty()
        .map_err(|err| {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        })
}

fn status(config: &AppConfig) -> ExitCode {
    let snapshot = match load_lenient(config) {
        Ok(snapshot) => snapshot,
        Err(code) => return code,
    };
    let now = Utc::now();
    println!("cache: {}", config.cache_path.display());
    for source in Source::ALL {
        let last = snapshot.last_refreshed(source);
        let stale = config.policy.is_due(source, now, last);
        println!(
            "{:<9} items={:<6} last_refreshed={} interval={}s stale={}",
            source.as_str(),
            snapshot.items(source).len(),
            last.map(|at| at.to_rfc3339()).unwrap_or_else(|| "never".to_string()),
            config.policy.interval(source).as_secs(),
            stale
        );
    }
    ExitCode::SUCCESS
}

fn help_text(config: &AppConfig) -> ExitCode {
    let snapshot = match load_lenient(config) {
        Ok(snapshot) => snapshot,
        Err(code) => return code,
    };
    print!("{}", render_help(&snapshot, &TagDescriptions::new()));
    ExitCode::SUCCESS
}

fn serve(config: &AppConfig) -> ExitCode {
    let mut tool = match QueryTool::open(&config.cache_path) {
        Ok(tool) => tool,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "event=serve_start module=cli status=ok cache_path={}",
        config.cache_path.display()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = tool.handle_json_line(&line);
        if writeln!(stdout, "{reply}").and_then(|()| stdout.flush()).is_err() {
            break;
        }
    }
    ExitCode::SUCCESS
}
