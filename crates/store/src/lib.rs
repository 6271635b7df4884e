//! Persistence of parsed directives.
//!
//! Directives are grouped by [`BatchScheduler`] into [`GraphOp`]s, applied to
//! a [`GraphStore`] (the embedded [`MemoryGraph`] or a [`CypherScript`]),
//! while [`SymbolStore`] records each directive's file and macro provenance.

pub mod batch;
pub mod error;
pub mod graph;
pub mod persist;
pub mod symbols;

pub use batch::{BatchLimits, BatchScheduler};
pub use error::{Error, Result};
pub use graph::cypher::{render, CypherScript, Statement};
pub use graph::memory::{GraphNode, MemoryGraph};
pub use graph::{EdgeKind, GraphOp, GraphStore};
pub use persist::{write_atomic, write_staged, Staged};
pub use symbols::{SymbolCounts, SymbolStore, SymbolWriter};
