//! Summary of one configuration run.

use ir::{DirectiveKind, Warning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use store::SymbolCounts;

/// Wall time per pipeline stage, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub parse_ms: u128,
    pub clear_ms: u128,
    pub populate_ms: u128,
    pub index_ms: u128,
    pub commit_ms: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub configuration: String,
    /// BLAKE3 hex digest of the dump.
    pub dump_hash: String,
    pub directives: u64,
    /// Directive count per batch kind.
    pub by_kind: BTreeMap<String, u64>,
    pub symbols: SymbolCounts,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub batches: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cypher_statements: Option<usize>,
    pub warnings: Vec<Warning>,
    pub timings: StageTimings,
}

impl RunReport {
    pub(crate) fn count(&mut self, kind: DirectiveKind) {
        self.directives += 1;
        *self.by_kind.entry(kind.as_str().to_string()).or_default() += 1;
    }

    /// Copy with timings zeroed, for comparing runs.
    pub fn without_timings(&self) -> Self {
        Self {
            timings: StageTimings::default(),
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse report {}", path.display()))
    }
}
