//! Pipeline orchestration.
//!
//! One run reads a configuration dump line by line, builds directives,
//! recovers their constants and populates the graph and symbol stores. A
//! run only replaces a configuration's persisted state once every stage
//! has succeeded.

use anyhow::Context as _;
use ir::{Context, Diagnostics};
use parsers::{DirectiveFactory, DumpParser, SourceLocator};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use store::{
    BatchLimits, BatchScheduler, CypherScript, GraphOp, GraphStore, MemoryGraph, SymbolStore,
};
use tracing::{debug, info, warn};

pub mod events;
pub mod lock;
pub mod report;

pub use events::{set_run_sink, RunEvent, RunSink};
pub use lock::{RunGuard, RunInProgress};
pub use report::{RunReport, StageTimings};

use crate::events::emit;

/// Lines between two progress events.
const PROGRESS_STEP: usize = 1000;

pub const SYMBOLS_FILE: &str = "symbols.sqlite3";

/// Serializes writers of the shared symbol database.
static SYMBOL_DB: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Namespace of every persisted row and file.
    pub configuration: String,
    pub dump: PathBuf,
    /// Root of the original configuration tree. Without it constants are
    /// not recovered.
    pub config_root: Option<PathBuf>,
    pub store_dir: PathBuf,
    pub limits: BatchLimits,
    /// Also write the graph operations as a Cypher script.
    pub cypher: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(configuration: impl Into<String>, dump: impl Into<PathBuf>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            configuration: configuration.into(),
            dump: dump.into(),
            config_root: None,
            store_dir: store_dir.into(),
            limits: BatchLimits::default(),
            cypher: None,
        }
    }
}

pub fn graph_path(store_dir: &Path, configuration: &str) -> PathBuf {
    store_dir.join(format!("{configuration}.graph.json"))
}

pub fn report_path(store_dir: &Path, configuration: &str) -> PathBuf {
    store_dir.join(format!("{configuration}.report.json"))
}

pub fn symbols_path(store_dir: &Path) -> PathBuf {
    store_dir.join(SYMBOLS_FILE)
}

/// Graph sinks fed with the same operations.
struct Sinks {
    graph: MemoryGraph,
    cypher: Option<CypherScript>,
}

impl Sinks {
    fn apply(&mut self, ops: &[GraphOp]) -> anyhow::Result<()> {
        for op in ops {
            debug!(op = %op.describe(), "Applying graph operation");
            self.graph.execute(op)?;
            if let Some(script) = self.cypher.as_mut() {
                script.execute(op)?;
            }
        }
        Ok(())
    }
}

/// Parses one configuration and replaces its persisted state.
///
/// Fails with [`RunInProgress`] when the same configuration is already being
/// parsed in this process.
pub fn run_parse(opts: &RunOptions) -> anyhow::Result<RunReport> {
    let _guard = RunGuard::acquire(&opts.configuration)?;
    let name = opts.configuration.as_str();
    info!(configuration = name, dump = %opts.dump.display(), "Parsing configuration");

    let text = fs::read_to_string(&opts.dump)
        .with_context(|| format!("failed to read dump {}", opts.dump.display()))?;
    let mut report = RunReport {
        configuration: name.to_string(),
        dump_hash: blake3::hash(text.as_bytes()).to_hex().to_string(),
        ..Default::default()
    };
    emit(RunEvent::Started {
        configuration: name.to_string(),
        total_lines: text.lines().count(),
    });

    fs::create_dir_all(&opts.store_dir)
        .with_context(|| format!("failed to create store {}", opts.store_dir.display()))?;

    let start = Instant::now();
    let mut sinks = Sinks {
        graph: MemoryGraph::new(),
        cypher: opts
            .cypher
            .as_ref()
            .map(CypherScript::create)
            .transpose()
            .context("failed to create Cypher script")?,
    };
    sinks.graph.clear()?;
    if let Some(script) = sinks.cypher.as_mut() {
        script.clear()?;
    }
    report.timings.clear_ms += start.elapsed().as_millis();

    let mut factory = DirectiveFactory::new(opts.config_root.as_ref().map(SourceLocator::new));
    let mut parser = DumpParser::new();
    let mut scheduler = BatchScheduler::new(opts.limits);
    let mut diag = Diagnostics::new();
    let mut origins: Vec<(u64, Context)> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let start = Instant::now();
        let parsed = parser
            .feed_line(line, &mut factory, &mut diag)
            .with_context(|| format!("{}: dump line {}", opts.dump.display(), idx + 1))?;
        report.timings.parse_ms += start.elapsed().as_millis();

        if let Some(d) = parsed {
            let start = Instant::now();
            report.count(d.batch_kind());
            origins.push((d.node_id, d.context.clone()));
            sinks.apply(&scheduler.push(d))?;
            report.timings.populate_ms += start.elapsed().as_millis();
        }
        if (idx + 1) % PROGRESS_STEP == 0 {
            emit(RunEvent::Progress {
                configuration: name.to_string(),
                lines: idx + 1,
            });
        }
    }
    if let Some(locator) = factory.locator() {
        debug!(files = locator.files_read(), "Source files read");
    }

    let start = Instant::now();
    sinks.apply(&scheduler.finish())?;
    report.timings.index_ms += start.elapsed().as_millis();
    report.batches = scheduler.flushed();

    let start = Instant::now();
    // Graph and script wait at their temp paths until the symbol tables
    // commit; an early return drops them and the previous outputs survive.
    let mut staged = Vec::with_capacity(2);
    if let Some(script) = sinks.cypher.take() {
        report.cypher_statements = Some(script.statements());
        staged.push(script.stage().context("failed to write Cypher script")?);
    }
    staged.push(
        sinks
            .graph
            .stage(&graph_path(&opts.store_dir, name))
            .context("failed to save graph")?,
    );
    {
        let _db = SYMBOL_DB.lock().unwrap_or_else(|e| e.into_inner());
        let mut symbols = SymbolStore::open(symbols_path(&opts.store_dir))
            .context("failed to open symbol store")?;
        let mut writer = symbols.begin(name)?;
        for (node_id, context) in &origins {
            writer.record(*node_id, context, &mut diag)?;
        }
        report.symbols = writer.commit()?;
    }
    for file in staged {
        let path = file.path().to_path_buf();
        file.commit()
            .with_context(|| format!("failed to move {} into place", path.display()))?;
    }
    report.graph_nodes = sinks.graph.node_count();
    report.graph_edges = sinks.graph.edge_count();
    report.warnings = diag.warnings;
    report.timings.commit_ms += start.elapsed().as_millis();

    let json = report.to_json()?;
    store::write_atomic(&report_path(&opts.store_dir, name), json.as_bytes())
        .context("failed to write run report")?;

    if !report.warnings.is_empty() {
        warn!(configuration = name, warnings = report.warnings.len(), "Run completed with warnings");
    }
    info!(
        configuration = name,
        directives = report.directives,
        nodes = report.graph_nodes,
        "Configuration parsed"
    );
    emit(RunEvent::Finished {
        configuration: name.to_string(),
        directives: report.directives,
    });
    Ok(report)
}

/// Runs independent configurations in parallel, one pipeline each. Results
/// keep the order of `runs`.
pub fn run_many(runs: &[RunOptions]) -> Vec<(String, anyhow::Result<RunReport>)> {
    runs.par_iter()
        .map(|opts| (opts.configuration.clone(), run_parse(opts)))
        .collect()
}
