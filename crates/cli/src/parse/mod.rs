//! `parse` and `batch` subcommands.

use anyhow::{bail, Context, Result};
use engine::{set_run_sink, RunOptions, RunReport};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::args::{BatchArgs, ParseArgs};
use crate::config::{load_config, Config};
use crate::output::{self, Format};
use crate::ui::{ProgressBar, ProgressSink};
use crate::{default_name, init_logging, is_valid_name};

/// Builds run options from the flags, falling back to the config file.
pub fn parse_options(args: &ParseArgs, cfg: &Config) -> Result<RunOptions> {
    let name = match &args.name {
        Some(n) => n.clone(),
        None => default_name(&args.dump)?,
    };
    let mut opts = RunOptions::new(
        name,
        &args.dump,
        cfg.store_dir(args.store.store.as_deref()),
    );
    if !args.no_recovery {
        opts.config_root = Some(match &args.config_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("failed to read current directory")?,
        });
    }
    let mut limits = cfg.batch.limits();
    if let Some(n) = args.batch_size {
        limits.generic = n;
    }
    if let Some(n) = args.small_batch_size {
        limits.small = n;
    }
    if let Some(n) = args.range_chunk {
        limits.range_chunk = n;
    }
    opts.limits = limits;
    opts.cypher = args.cypher.clone();
    Ok(opts)
}

/// Runs `f` with a progress sink installed, removing it afterwards.
fn with_progress<T>(quiet: bool, f: impl FnOnce() -> T) -> T {
    let bar = if quiet { None } else { ProgressBar::new() };
    let sink = ProgressSink::new(bar);
    set_run_sink(Some(Box::new(sink.clone())));
    let out = f();
    set_run_sink(None);
    sink.finish();
    out
}

pub fn run_parse(args: ParseArgs) -> Result<()> {
    init_logging(args.log);
    let cfg = load_config()?;
    let opts = parse_options(&args, &cfg)?;
    info!(
        configuration = %opts.configuration,
        store = %opts.store_dir.display(),
        recovery = opts.config_root.is_some(),
        "Parse started"
    );
    let report = with_progress(args.log.quiet, || engine::run_parse(&opts))?;
    output::print_report(&report, args.format)
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default, rename = "configuration")]
    configurations: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: Option<String>,
    dump: PathBuf,
    config_root: Option<PathBuf>,
    #[serde(default)]
    no_recovery: bool,
    cypher: Option<PathBuf>,
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Reads a batch manifest. Relative paths are taken from the manifest's
/// directory; entries without `config_root` recover constants from
/// `default_root` unless they set `no_recovery`.
pub fn load_manifest(
    path: &Path,
    cfg: &Config,
    store: &Path,
    default_root: &Path,
) -> Result<Vec<RunOptions>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: Manifest = toml::from_str(&text)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    if manifest.configurations.is_empty() {
        bail!("manifest {} lists no [[configuration]]", path.display());
    }
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut names = HashSet::new();
    let mut runs = Vec::with_capacity(manifest.configurations.len());
    for entry in manifest.configurations {
        let dump = resolve(base, &entry.dump);
        let name = match entry.name {
            Some(n) if is_valid_name(&n) => n,
            Some(n) => bail!("invalid configuration name '{n}' in {}", path.display()),
            None => default_name(&dump)?,
        };
        if !names.insert(name.clone()) {
            bail!("configuration '{name}' listed twice in {}", path.display());
        }
        let config_root = match (entry.no_recovery, entry.config_root) {
            (true, _) => None,
            (false, Some(root)) => Some(resolve(base, &root)),
            (false, None) => {
                debug!(
                    configuration = %name,
                    root = %default_root.display(),
                    "Using default configuration root"
                );
                Some(default_root.to_path_buf())
            }
        };
        let mut opts = RunOptions::new(name, dump, store);
        opts.config_root = config_root;
        opts.cypher = entry.cypher.map(|p| resolve(base, &p));
        opts.limits = cfg.batch.limits();
        runs.push(opts);
    }
    Ok(runs)
}

#[derive(Serialize)]
struct BatchResult<'a> {
    configuration: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run_batch(args: BatchArgs) -> Result<()> {
    init_logging(args.log);
    let cfg = load_config()?;
    let store = cfg.store_dir(args.store.store.as_deref());
    let default_root = match &args.config_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let runs = load_manifest(&args.manifest, &cfg, &store, &default_root)?;
    info!(
        configurations = runs.len(),
        threads = args.threads,
        store = %store.display(),
        "Batch started"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .context("failed to build thread pool")?;
    let start = Instant::now();
    let results = with_progress(args.log.quiet, || pool.install(|| engine::run_many(&runs)));

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    match args.format {
        Format::Json => {
            let view: Vec<BatchResult> = results
                .iter()
                .map(|(name, res)| BatchResult {
                    configuration: name,
                    report: res.as_ref().ok(),
                    error: res.as_ref().err().map(|e| format!("{e:#}")),
                })
                .collect();
            output::print_json(&view)?;
        }
        Format::Text => {
            for (name, res) in &results {
                match res {
                    Ok(report) => output::print_report(report, Format::Text)?,
                    Err(e) => output::print_error(name, &format!("{e:#}")),
                }
            }
        }
    }
    for (name, res) in &results {
        if let Err(e) = res {
            error!(configuration = %name, "Run failed: {e:#}");
        }
    }
    info!(
        configurations = results.len(),
        failed,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Batch completed"
    );
    if failed > 0 {
        bail!("{failed} of {} configurations failed", results.len());
    }
    Ok(())
}
