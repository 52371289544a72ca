//! Configuration file parsing and data locations

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::HistoryError;
use crate::timestamp::{DisplayFormat, DisplayZone};

const APP_DIR: &str = "glucose-history";

const DEFAULT_CONFIG: &str = "\
# glucose-history configuration
# One setting per line: key value

# SQLite database holding imported sessions (default: data directory)
# database_path /path/to/sessions.db

# chrono format strings for session dates and reading times
date_format %-m/%-d/%Y
time_format %-I:%M:%S %p

# local, UTC, or a fixed offset such as +02:00
utc_offset local
";

/// Configuration loaded from config.txt
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Config {
    pub database_path: Option<String>,
    pub date_format: Option<String>,
    pub time_format: Option<String>,
    pub utc_offset: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut config = Config::default();

        for line in reader.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse "key value" or "key value # comment"
            if let Some((key, rest)) = Self::parse_line(line) {
                let value = rest.split('#').next().unwrap_or("").trim();
                if value.is_empty() {
                    continue;
                }
                let value = Some(value.to_string());
                match key {
                    "database_path" => config.database_path = value,
                    "date_format" => config.date_format = value,
                    "time_format" => config.time_format = value,
                    "utc_offset" => config.utc_offset = value,
                    other => warn!("Ignoring unknown config key '{}'", other),
                }
            }
        }

        Ok(config)
    }

    /// Parse a single config line, returning (key, value)
    fn parse_line(line: &str) -> Option<(&str, &str)> {
        // Find first whitespace to separate key from value
        let mut parts = line.splitn(2, |c: char| c.is_whitespace());
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();

        if key.is_empty() || value.is_empty() {
            return None;
        }

        Some((key, value))
    }

    /// Write the commented default configuration
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), HistoryError> {
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Display settings, falling back to defaults for unset keys
    pub fn display_format(&self) -> Result<DisplayFormat, HistoryError> {
        let defaults = DisplayFormat::default();
        let zone = match &self.utc_offset {
            Some(offset) => DisplayZone::parse(offset)?,
            None => defaults.zone(),
        };
        DisplayFormat::new(
            self.date_format.as_deref().unwrap_or(defaults.date_format()),
            self.time_format.as_deref().unwrap_or(defaults.time_format()),
            zone,
        )
    }

    /// Configured database path or the OS-specific default
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path)
    }
}

/// Application data directory, e.g. `~/.local/share/glucose-history`
pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn ensure_data_dir() -> Result<PathBuf, HistoryError> {
    let dir = get_data_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_database_path() -> PathBuf {
    get_data_dir().join("sessions.db")
}

pub fn config_file_path() -> PathBuf {
    get_data_dir().join("config.txt")
}
