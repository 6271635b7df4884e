//! Read-only queries over a parsed configuration.

use anyhow::{bail, Context, Result};
use engine::{graph_path, symbols_path};
use ir::{FileContext, Trace};
use parsers::SourceLocator;
use std::path::{Path, PathBuf};
use store::{MemoryGraph, SymbolStore};
use tracing::{debug, warn};

use crate::args::{RemovedByArgs, TraceArgs, UsesArgs};
use crate::config::load_config;
use crate::init_logging;
use crate::output::{self, TraceView};

fn load_graph(store_dir: &Path, name: &str) -> Result<MemoryGraph> {
    let path = graph_path(store_dir, name);
    if !path.exists() {
        bail!(
            "configuration '{name}' has not been parsed into {}",
            store_dir.display()
        );
    }
    MemoryGraph::load(&path).with_context(|| format!("failed to load graph {}", path.display()))
}

/// Literal text at `file:line` of the configuration tree, when readable.
fn source_line(locator: &mut SourceLocator, file: &str, line: Option<i64>) -> Option<String> {
    let line = u32::try_from(line?).ok()?;
    let path = locator.resolve(&FileContext::new(Some(line), file));
    match locator.find_line(&path, line, 0, None) {
        Ok(text) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(file = %path.display(), line, "Source line unavailable: {e}");
            None
        }
    }
}

/// Source text of the origin followed by every hop's use site.
pub fn trace_sources(trace: &Trace, root: PathBuf) -> Vec<Option<String>> {
    let mut locator = SourceLocator::new(root);
    let mut out = Vec::with_capacity(trace.hops.len() + 1);
    out.push(source_line(
        &mut locator,
        &trace.origin.file_path,
        trace.origin.line_number,
    ));
    for hop in &trace.hops {
        out.push(source_line(&mut locator, &hop.use_file, hop.use_line));
    }
    debug!(files = locator.files_read(), "Source files read");
    out
}

pub fn run_trace(args: TraceArgs) -> Result<()> {
    init_logging(args.log);
    let cfg = load_config()?;
    let store_dir = cfg.store_dir(args.store.store.as_deref());
    let db = symbols_path(&store_dir);
    if !db.exists() {
        bail!("no symbol store at {}", db.display());
    }
    let symbols = SymbolStore::open(&db)
        .with_context(|| format!("failed to open symbol store {}", db.display()))?;
    let Some(trace) = symbols.trace(&args.name, args.node_id)? else {
        bail!(
            "directive {} not found in configuration '{}'",
            args.node_id,
            args.name
        );
    };
    let sources = args.config_root.map(|root| trace_sources(&trace, root));
    output::print_trace(
        &TraceView {
            trace: &trace,
            sources,
        },
        args.format,
    )
}

pub fn run_uses(args: UsesArgs) -> Result<()> {
    init_logging(args.log);
    let cfg = load_config()?;
    let graph = load_graph(&cfg.store_dir(args.store.store.as_deref()), &args.name)?;
    let ids = graph.directives_using(&args.symbol);
    debug!(symbol = %args.symbol, matches = ids.len(), "Usage query");
    output::print_directives(&format!("uses {}", args.symbol), &ids, args.format)
}

pub fn run_removed_by(args: RemovedByArgs) -> Result<()> {
    init_logging(args.log);
    let cfg = load_config()?;
    let graph = load_graph(&cfg.store_dir(args.store.store.as_deref()), &args.name)?;
    let (label, ids) = match (args.id, &args.tag) {
        (Some(id), _) => (format!("removes id {id}"), graph.removed_by_id(id)),
        (None, Some(tag)) => (format!("removes tag {tag}"), graph.removed_by_tag(tag)),
        (None, None) => bail!("either --id or --tag is required"),
    };
    output::print_directives(&label, &ids, args.format)
}
