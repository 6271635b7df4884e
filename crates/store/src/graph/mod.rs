//! Graph population.
//!
//! The batch scheduler produces [`GraphOp`]s; a [`GraphStore`] applies them.
//! Two stores exist: the embedded [`memory::MemoryGraph`] and the
//! [`cypher::CypherScript`] writer that renders the same operations as
//! Cypher for an external graph database.

pub mod cypher;
pub mod memory;

use ir::{Directive, DirectiveKind};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Label shared by every directive node, next to its type label.
pub const DIRECTIVE_LABEL: &str = "Directive";

/// `(label, property)` pairs indexed at the end of a run.
pub const INDEXES: &[(&str, &str)] = &[
    (DIRECTIVE_LABEL, "node_id"),
    ("Id", "value"),
    ("Tag", "value"),
    ("Phase", "value"),
    ("Regex", "value"),
    ("Location", "value"),
    ("VirtualHost", "value"),
    ("Constant", "name"),
    ("Variable", "name"),
    ("Collection", "name"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    InPhase,
    Has,
    AtLocation,
    InVirtualHost,
    Uses,
    Define,
    Sets,
    Unsets,
    DoesRemove,
    Match,
    IsVariableOf,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::InPhase => "InPhase",
            EdgeKind::Has => "Has",
            EdgeKind::AtLocation => "AtLocation",
            EdgeKind::InVirtualHost => "InVirtualHost",
            EdgeKind::Uses => "Uses",
            EdgeKind::Define => "Define",
            EdgeKind::Sets => "Sets",
            EdgeKind::Unsets => "Unsets",
            EdgeKind::DoesRemove => "DoesRemove",
            EdgeKind::Match => "Match",
            EdgeKind::IsVariableOf => "IsVariableOf",
        }
    }
}

/// Compiles a removal pattern the way the graph applies it: anchored at
/// both ends of the tag. Patterns that fail here never become Regex nodes.
pub fn tag_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// One write against the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    /// Creates one node per directive of a single batch kind, with its
    /// scope, usage and kind-specific relationships.
    MergeDirectives {
        kind: DirectiveKind,
        directives: Vec<Directive>,
    },
    /// Links removal directive `node_id` to every Id in `start..=end`.
    ExpandRange { node_id: u64, start: u64, end: u64 },
    CreateIndexes,
}

impl GraphOp {
    pub fn describe(&self) -> String {
        match self {
            GraphOp::MergeDirectives { kind, directives } => {
                format!("merge {} {} directives", directives.len(), kind.as_str())
            }
            GraphOp::ExpandRange {
                node_id,
                start,
                end,
            } => format!("expand ids {start}-{end} for node {node_id}"),
            GraphOp::CreateIndexes => "create indexes".to_string(),
        }
    }
}

pub trait GraphStore {
    /// Removes everything previously written.
    fn clear(&mut self) -> Result<()>;

    fn execute(&mut self, op: &GraphOp) -> Result<()>;

    fn execute_all(&mut self, ops: &[GraphOp]) -> Result<()> {
        for op in ops {
            self.execute(op)?;
        }
        Ok(())
    }
}
