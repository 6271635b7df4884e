//! Non-fatal problems collected during a run.
//!
//! Recoverable content errors and directive-level I/O errors never abort a
//! run; they end up here so the run report can list them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// `A-B` removal range that is malformed or wider than the cap.
    InvalidRange,
    /// A tainted `$name`/`@name` token is not a formal parameter of the macro.
    UnknownParameter,
    /// The locator walked past the end of a file.
    LineNotFound,
    /// The original source file could not be read or the start line is missing.
    SourceUnavailable,
    /// The context chain ends in a bare line reference.
    MalformedContext,
    /// A directive appeared before any `# In file:` annotation.
    MissingContext,
    /// A `setvar` entry that could not be split into collection and name.
    InvalidSetvar,
    /// A removal pattern that is not a valid regular expression.
    InvalidPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, kind: WarningKind, node_id: Option<u64>, message: impl Into<String>) {
        self.warnings.push(Warning {
            kind,
            message: message.into(),
            node_id,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}
