use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::is_valid_name;
use crate::output::Format;

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn parse_threads(s: &str) -> Result<usize, String> {
    let v: usize = s
        .parse()
        .map_err(|e: std::num::ParseIntError| e.to_string())?;
    if v == 0 {
        Err("threads must be greater than 0".into())
    } else {
        Ok(v)
    }
}

fn parse_name(s: &str) -> Result<String, String> {
    if is_valid_name(s) {
        Ok(s.to_string())
    } else {
        Err("names may only contain letters, digits, '-', '_' and '.'".into())
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Trace Apache/ModSecurity directives back to the macros and files they come from",
    long_about = "conftrace reads the expanded configuration dump of an Apache server, rebuilds the macro call chain of every directive, recovers the constants each directive depends on and stores the result as a property graph plus a relational symbol table.

Examples:
  conftrace parse dump.txt --config-root /etc/httpd     # Parse one configuration
  conftrace batch configurations.toml                   # Parse several in parallel
  conftrace trace dump 42                               # Where does directive 42 come from?
  conftrace uses dump site_host                         # Who uses this constant?
  conftrace removed-by dump --id 942100                 # Who removes this rule?",
    subcommand_required = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a configuration dump into the graph and symbol stores
    Parse(ParseArgs),
    /// Parse every configuration listed in a manifest, in parallel
    Batch(BatchArgs),
    /// Show the file and macro provenance of a directive
    Trace(TraceArgs),
    /// List directives that use a constant, variable or collection
    Uses(UsesArgs),
    /// List directives that remove a rule id or tag
    RemovedBy(RemovedByArgs),
}

#[derive(ClapArgs, Clone, Copy)]
pub struct LogArgs {
    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
    /// Suppress non-essential output
    #[arg(long)]
    pub quiet: bool,
}

#[derive(ClapArgs)]
pub struct StoreArgs {
    /// Directory holding the stores (overrides `[store] dir`)
    #[arg(long = "store")]
    pub store: Option<PathBuf>,
}

#[derive(ClapArgs)]
pub struct ParseArgs {
    /// Expanded configuration dump
    pub dump: PathBuf,
    /// Configuration name (defaults to the dump's file stem)
    #[arg(long, value_parser = parse_name)]
    pub name: Option<String>,
    /// Root of the original configuration tree
    #[arg(long = "config-root", env = "CONFIG_ROOT")]
    pub config_root: Option<PathBuf>,
    /// Skip constant recovery
    #[arg(long = "no-recovery")]
    pub no_recovery: bool,
    /// Also write the graph operations as a cypher-shell script
    #[arg(long)]
    pub cypher: Option<PathBuf>,
    /// Flush threshold of directive batches (overrides `[batch] generic`)
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,
    /// Flush threshold of SecRuleRemoveById batches (overrides `[batch] small`)
    #[arg(long = "small-batch-size")]
    pub small_batch_size: Option<usize>,
    /// Ids per range expansion (overrides `[batch] range_chunk`)
    #[arg(long = "range-chunk")]
    pub range_chunk: Option<u64>,
    /// Output format of the run report
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(ClapArgs)]
pub struct BatchArgs {
    /// TOML manifest with `[[configuration]]` entries
    pub manifest: PathBuf,
    /// Number of configurations parsed at once
    #[arg(long, default_value_t = default_threads(), value_parser = parse_threads)]
    pub threads: usize,
    /// Configuration tree for entries without `config_root` (defaults to
    /// the current directory)
    #[arg(long = "config-root", env = "CONFIG_ROOT")]
    pub config_root: Option<PathBuf>,
    /// Output format of the run reports
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(ClapArgs)]
pub struct TraceArgs {
    /// Configuration name
    #[arg(value_parser = parse_name)]
    pub name: String,
    /// Directive node id
    pub node_id: u64,
    /// Print the source line of every hop from this tree
    #[arg(long = "config-root", env = "CONFIG_ROOT")]
    pub config_root: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(ClapArgs)]
pub struct UsesArgs {
    /// Configuration name
    #[arg(value_parser = parse_name)]
    pub name: String,
    /// Constant, variable or collection name
    pub symbol: String,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(ClapArgs)]
#[command(group = clap::ArgGroup::new("target").required(true).args(["id", "tag"]))]
pub struct RemovedByArgs {
    /// Configuration name
    #[arg(value_parser = parse_name)]
    pub name: String,
    /// Rule id
    #[arg(long)]
    pub id: Option<u64>,
    /// Rule tag
    #[arg(long)]
    pub tag: Option<String>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
    #[command(flatten)]
    pub store: StoreArgs,
    #[command(flatten)]
    pub log: LogArgs,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
