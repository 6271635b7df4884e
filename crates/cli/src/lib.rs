//! Common utilities for the command line interface.
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;
use tracing::level_filters::LevelFilter;

use crate::args::LogArgs;

pub mod args;
pub mod config;
pub mod output;
pub mod parse;
pub mod query;
pub mod ui;

/// Installs the stderr subscriber. `--quiet` wins over `--debug`.
pub fn init_logging(log: LogArgs) {
    let level = if log.quiet {
        LevelFilter::OFF
    } else if log.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    if log.debug && !log.quiet {
        debug!("Debug mode enabled");
    }
}

/// Whether `name` can be used as a configuration name. Names become file
/// names inside the store directory.
///
/// # Example
///
/// ```
/// use conftrace::is_valid_name;
/// assert!(is_valid_name("prod-eu_1"));
/// assert!(!is_valid_name("../prod"));
/// ```
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Configuration name derived from a dump path: its file stem with every
/// character outside `[A-Za-z0-9._-]` replaced by `_`.
///
/// # Example
///
/// ```
/// use conftrace::default_name;
/// use std::path::Path;
/// assert_eq!(default_name(Path::new("/var/dumps/site a.txt")).unwrap(), "site_a");
/// ```
pub fn default_name(dump: &Path) -> Result<String> {
    let stem = dump
        .file_stem()
        .map(|s| s.to_string_lossy())
        .with_context(|| format!("cannot derive a configuration name from {}", dump.display()))?;
    let name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_start_matches('.').to_string();
    if is_valid_name(&name) {
        Ok(name)
    } else {
        anyhow::bail!("cannot derive a configuration name from {}", dump.display())
    }
}
