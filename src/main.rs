//! Glucose Session History Viewer
//!
//! Shows the ten most recent glucose-monitoring sessions with color-coded
//! glycemic states. Sessions come from a local SQLite store (filled with
//! `import`) or straight from an exported JSON snapshot.
//!
//! Usage:
//!   glucose-history                      - Show recent sessions in the terminal
//!   glucose-history show --html out.html - Write an HTML page instead
//!   glucose-history import export.json   - Import sessions into the database
//!   glucose-history --help               - Show help
//!   GLUCOSE_HISTORY_DBG=1 glucose-history - Enable debug output

mod classify;
mod config;
mod error;
mod fetch;
mod model;
mod render;
mod shape;
mod snapshot;
mod storage;
mod summary;
mod timestamp;

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::{error, info, warn};

use crate::config::{config_file_path, default_database_path, ensure_data_dir, get_data_dir, Config};
use crate::error::HistoryError;
use crate::fetch::{FetchOutcome, SessionFetcher, SessionStore};
use crate::render::{present, HtmlSurface, JsonSurface, TextSurface};
use crate::shape::SessionShaper;
use crate::snapshot::{read_documents, SnapshotStore};
use crate::storage::SqliteStore;
use crate::timestamp::TimestampNormalizer;

/// Where the shaped sessions go
#[derive(Debug, Clone, PartialEq)]
enum Output {
    Terminal,
    Html(PathBuf),
    Json,
}

/// Where sessions are read from
#[derive(Debug, Clone, PartialEq)]
enum Source {
    Database(PathBuf),
    Snapshot(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
struct ShowOptions {
    output: Output,
    source: Option<Source>,
    color: bool,
}

fn main() -> Result<(), HistoryError> {
    let args: Vec<String> = env::args().collect();

    // Check for debug mode
    let debug_mode = env::var("GLUCOSE_HISTORY_DBG").is_ok();

    // Initialize logger; warnings and errors always reach stderr
    let default_filter = if debug_mode { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    // Ensure data directory exists
    if let Err(e) = ensure_data_dir() {
        warn!("Could not create data directory: {}", e);
    }

    // Create default config if it doesn't exist
    let cfg_path = config_file_path();
    if !cfg_path.exists() {
        if let Err(e) = Config::create_default(&cfg_path) {
            info!("Could not create default config: {}", e);
        }
    }

    // Try loading config from data directory first, then current directory
    let config = Config::load(&cfg_path)
        .or_else(|_| Config::load("config.txt"))
        .unwrap_or_else(|e| {
            info!("Could not load config: {}. Using defaults.", e);
            Config::default()
        });

    let normalizer = TimestampNormalizer::new(config.display_format()?);

    match args.get(1).map(|s| s.as_str()) {
        None => cmd_show(&config, normalizer, &[])?,
        Some("show") => cmd_show(&config, normalizer, &args[2..])?,
        Some(flag) if flag.starts_with("--") && !matches!(flag, "--help" | "--version") => {
            cmd_show(&config, normalizer, &args[1..])?
        }
        Some("import") => {
            let file = args
                .get(2)
                .ok_or_else(|| HistoryError::Config("import needs a JSON file".to_string()))?;
            cmd_import(&config, &normalizer, file)?;
        }
        Some("--help") | Some("-h") | Some("help") => {
            print_help();
        }
        Some("--version") | Some("-V") => {
            println!("glucose-history {}", env!("CARGO_PKG_VERSION"));
        }
        Some("path") | Some("paths") => {
            cmd_show_paths(&config);
        }
        Some(other) => {
            print_help();
            return Err(HistoryError::UnknownCommand(other.to_string()));
        }
    }

    Ok(())
}

fn parse_show_options(args: &[String]) -> Result<ShowOptions, HistoryError> {
    let mut options = ShowOptions {
        output: Output::Terminal,
        source: None,
        color: supports_color::on(supports_color::Stream::Stdout).is_some(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .map(PathBuf::from)
                .ok_or_else(|| HistoryError::Config(format!("{} needs a path", name)))
        };
        match arg.as_str() {
            "--html" => options.output = Output::Html(value("--html")?),
            "--json" => options.output = Output::Json,
            "--db" => options.source = Some(Source::Database(value("--db")?)),
            "--snapshot" => options.source = Some(Source::Snapshot(value("--snapshot")?)),
            "--no-color" => options.color = false,
            other => return Err(HistoryError::UnknownCommand(other.to_string())),
        }
    }

    Ok(options)
}

fn open_store(
    source: &Source,
    normalizer: &TimestampNormalizer,
) -> Result<Box<dyn SessionStore>, HistoryError> {
    match source {
        Source::Database(path) => Ok(Box::new(SqliteStore::new(path)?)),
        Source::Snapshot(path) => Ok(Box::new(SnapshotStore::new(path, normalizer.clone()))),
    }
}

/// Fetch recent sessions; a store that cannot be opened is a failed fetch
fn fetch_from(source: &Source, normalizer: &TimestampNormalizer) -> FetchOutcome {
    match open_store(source, normalizer) {
        Ok(store) => SessionFetcher::new(store).fetch_recent(),
        Err(e) => {
            error!("Could not open session store {:?}: {}", source, e);
            FetchOutcome::LoadError(e.to_string())
        }
    }
}

/// Fetch and render recent sessions
fn cmd_show(config: &Config, normalizer: TimestampNormalizer, args: &[String]) -> Result<(), HistoryError> {
    let options = parse_show_options(args)?;
    let source = options
        .source
        .clone()
        .unwrap_or_else(|| Source::Database(config.database_path()));

    let outcome = fetch_from(&source, &normalizer);

    let shaper = SessionShaper::new(normalizer);
    match &options.output {
        Output::Terminal => {
            let stdout = io::stdout();
            let mut surface = TextSurface::new(stdout.lock(), options.color);
            present(outcome, &shaper, &mut surface)?;
        }
        Output::Html(path) => {
            let mut surface = HtmlSurface::new();
            let shown = present(outcome, &shaper, &mut surface)?;
            fs::write(path, surface.finish())?;
            eprintln!("Wrote {} sessions to {}", shown, path.display());
        }
        Output::Json => {
            let mut surface = JsonSurface::new();
            present(outcome, &shaper, &mut surface)?;
            println!("{}", surface.finish()?);
        }
    }

    Ok(())
}

/// Import an exported JSON file into the database
fn cmd_import(config: &Config, normalizer: &TimestampNormalizer, file: &str) -> Result<(), HistoryError> {
    let db_path = config.database_path();
    info!("Importing sessions from {}", file);

    let documents = read_documents(file)?;
    let storage = SqliteStore::new(&db_path)?;
    let summary = storage.import_documents(&documents, normalizer)?;
    let total_count = storage.count()?;

    // Always print summary (not just in debug mode)
    eprintln!("Read {} session documents from {}", documents.len(), file);
    eprintln!("  New sessions:    {}", summary.imported);
    eprintln!("  Duplicates:      {} (skipped)", summary.duplicates);
    eprintln!("  Invalid:         {} (skipped)", summary.invalid);
    eprintln!("  Total in DB:     {}", total_count);
    eprintln!("Saved to: {}", db_path.display());
    Ok(())
}

/// Show data paths
fn cmd_show_paths(config: &Config) {
    println!("Glucose History Data Paths:");
    println!("  Data directory:  {}", get_data_dir().display());
    println!("  Database:        {}", config.database_path().display());
    println!("  Default DB:      {}", default_database_path().display());
    println!("  Config file:     {}", config_file_path().display());
}

fn print_help() {
    eprintln!("Glucose Session History Viewer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  glucose-history [show] [OPTIONS]   Show the 10 most recent sessions");
    eprintln!("  glucose-history import FILE        Import a JSON session export");
    eprintln!("  glucose-history path               Show data file locations");
    eprintln!("  glucose-history help               Show this help");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("  --html FILE       Write an HTML page instead of a terminal table");
    eprintln!("  --json            Print sessions as JSON");
    eprintln!("  --db PATH         Read from this SQLite database");
    eprintln!("  --snapshot FILE   Read directly from a JSON export");
    eprintln!("  --no-color        Disable colored states");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  GLUCOSE_HISTORY_DBG=1            Enable debug output");
    eprintln!();
    eprintln!("DATA LOCATIONS:");
    eprintln!("  Database:  {}", default_database_path().display());
    eprintln!("  Config:    {}", config_file_path().display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_show_options() {
        let options = parse_show_options(&strings(&["--html", "out.html", "--snapshot", "s.json", "--no-color"])).unwrap();
        assert_eq!(options.output, Output::Html(PathBuf::from("out.html")));
        assert_eq!(options.source, Some(Source::Snapshot(PathBuf::from("s.json"))));
        assert!(!options.color);
    }

    #[test]
    fn test_parse_show_options_errors() {
        assert!(matches!(
            parse_show_options(&strings(&["--html"])),
            Err(HistoryError::Config(_))
        ));
        assert!(matches!(
            parse_show_options(&strings(&["--pdf"])),
            Err(HistoryError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_unopenable_database_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened as a database file
        let source = Source::Database(dir.path().to_path_buf());
        let outcome = fetch_from(&source, &TimestampNormalizer::default());
        assert!(matches!(outcome, FetchOutcome::LoadError(_)), "got {:?}", outcome);
    }

    #[test]
    fn test_missing_snapshot_is_load_error() {
        let source = Source::Snapshot(PathBuf::from("/nonexistent/export.json"));
        let outcome = fetch_from(&source, &TimestampNormalizer::default());
        assert!(matches!(outcome, FetchOutcome::LoadError(_)), "got {:?}", outcome);
    }
}
