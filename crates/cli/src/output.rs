use clap::ValueEnum;
use colored::Colorize;
use engine::RunReport;
use ir::Trace;
use serde::Serialize;
use std::env;

/// Output formats of every subcommand.
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            _ => Err("invalid format".into()),
        }
    }
}

pub fn use_colored_output() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    if let Ok(term) = env::var("TERM") {
        if term == "dumb" || term == "unknown" {
            return false;
        }
    }
    if env::var("CI").is_ok() || env::var("CONTINUOUS_INTEGRATION").is_ok() {
        return false;
    }
    true
}

pub fn print_colored(tag: &str, message: &str) {
    if use_colored_output() {
        println!("[{}] {}", tag.bright_blue().bold(), message);
    } else {
        println!("[{tag}] {message}");
    }
}

pub fn print_warning(tag: &str, message: &str) {
    if use_colored_output() {
        println!("[{}] {}", tag.bright_yellow().bold(), message);
    } else {
        println!("[{tag}] {message}");
    }
}

pub fn print_error(tag: &str, message: &str) {
    if use_colored_output() {
        println!("[{}] {}", tag.bright_red().bold(), message);
    } else {
        println!("[{tag}] {message}");
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_report(report: &RunReport, fmt: Format) -> anyhow::Result<()> {
    if fmt == Format::Json {
        return print_json(report);
    }
    let name = report.configuration.as_str();
    print_colored(
        name,
        &format!(
            "{} directives, {} graph nodes, {} edges, {} batches",
            report.directives, report.graph_nodes, report.graph_edges, report.batches
        ),
    );
    let kinds: Vec<String> = report
        .by_kind
        .iter()
        .map(|(kind, n)| format!("{kind}={n}"))
        .collect();
    if !kinds.is_empty() {
        print_colored(name, &format!("by kind: {}", kinds.join(", ")));
    }
    print_colored(
        name,
        &format!(
            "symbols: {} rows, {} macro definitions, {} macro calls",
            report.symbols.symbols, report.symbols.definitions, report.symbols.calls
        ),
    );
    if let Some(n) = report.cypher_statements {
        print_colored(name, &format!("cypher: {n} statements"));
    }
    let t = &report.timings;
    print_colored(
        name,
        &format!(
            "timings (ms): parse {}, clear {}, populate {}, index {}, commit {}",
            t.parse_ms, t.clear_ms, t.populate_ms, t.index_ms, t.commit_ms
        ),
    );
    for w in &report.warnings {
        let msg = match w.node_id {
            Some(id) => format!("{:?}: {} (directive {id})", w.kind, w.message),
            None => format!("{:?}: {}", w.kind, w.message),
        };
        print_warning("warning", &msg);
    }
    print_colored(name, &format!("dump blake3 {}", report.dump_hash));
    Ok(())
}

fn position(file: &str, line: Option<i64>) -> String {
    match line {
        Some(l) => format!("{file}:{l}"),
        None => file.to_string(),
    }
}

/// Trace output; `sources` holds the literal text of the origin followed by
/// each hop's use site, when the configuration tree was available.
#[derive(Serialize)]
pub struct TraceView<'a> {
    #[serde(flatten)]
    pub trace: &'a Trace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Option<String>>>,
}

pub fn print_trace(view: &TraceView<'_>, fmt: Format) -> anyhow::Result<()> {
    if fmt == Format::Json {
        return print_json(view);
    }
    let trace = view.trace;
    let source = |i: usize| {
        view.sources
            .as_ref()
            .and_then(|s| s.get(i).cloned().flatten())
    };
    let tag = format!("directive {}", trace.node_id);
    print_colored(
        &tag,
        &format!(
            "origin {}",
            position(&trace.origin.file_path, trace.origin.line_number)
        ),
    );
    if let Some(text) = source(0) {
        println!("    {}", text.trim());
    }
    for (i, hop) in trace.hops.iter().enumerate() {
        print_colored(
            &tag,
            &format!(
                "macro '{}' defined at {} used at {}",
                hop.macro_name,
                position(&hop.definition_file, hop.definition_line),
                position(&hop.use_file, hop.use_line)
            ),
        );
        if let Some(text) = source(i + 1) {
            println!("    {}", text.trim());
        }
    }
    Ok(())
}

/// Prints directive node ids found by a graph query.
pub fn print_directives(label: &str, ids: &[u64], fmt: Format) -> anyhow::Result<()> {
    if fmt == Format::Json {
        return print_json(ids);
    }
    if ids.is_empty() {
        print_warning(label, "no directives");
        return Ok(());
    }
    for id in ids {
        print_colored(label, &format!("directive {id}"));
    }
    Ok(())
}
