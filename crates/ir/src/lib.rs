//! Core types shared by the conftrace crates.
//!
//! [`Context`] describes where a directive's text comes from, [`Directive`]
//! is one effective statement of an expanded configuration dump, and the
//! [`symbol`] rows describe the relational provenance table.

pub mod context;
pub mod diagnostics;
pub mod directive;
pub mod symbol;

pub use context::{Context, FileContext, LineRef, MacroContext};
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use directive::{
    sort_by_evaluation, DefineStr, Directive, DirectiveKind, RemoveById, RemoveByTag,
    RuleVariable, SecRuleArgs, SetVar, VarRef, Variant,
};
pub use symbol::{MacroCall, MacroDefinition, SymbolRow, Trace, TraceHop};

#[cfg(test)]
mod tests;
