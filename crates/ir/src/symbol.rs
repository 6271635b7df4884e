//! Rows of the relational symbol table.

use serde::{Deserialize, Serialize};

/// One visited context node: a directive origin, a macro definition site or
/// a macro use site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRow {
    pub id: i64,
    pub file_path: String,
    pub line_number: Option<i64>,
    pub node_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub id: i64,
    pub name: String,
    pub symbol_id: i64,
}

/// One macro hop of directive `node_id`; `symbol_id` is the use-site row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCall {
    pub id: i64,
    pub node_id: u64,
    pub macro_definition_id: i64,
    pub symbol_id: i64,
}

/// Resolved hop of a provenance trace, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHop {
    pub macro_name: String,
    pub definition_file: String,
    pub definition_line: Option<i64>,
    pub use_file: String,
    pub use_line: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub node_id: u64,
    pub origin: SymbolRow,
    pub hops: Vec<TraceHop>,
}
