//! Entry point for the command-line interface.
//! Delegates to dedicated modules for argument handling, parsing runs
//! and read-only queries.

use conftrace::args::{parse_cli, Commands};
use conftrace::parse::{run_batch, run_parse};
use conftrace::query::{run_removed_by, run_trace, run_uses};

fn main() -> anyhow::Result<()> {
    let cli = parse_cli();
    match cli.command {
        Commands::Parse(args) => run_parse(args),
        Commands::Batch(args) => run_batch(args),
        Commands::Trace(args) => run_trace(args),
        Commands::Uses(args) => run_uses(args),
        Commands::RemovedBy(args) => run_removed_by(args),
    }
}
