//! Error types for dump parsing and constant recovery.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A `# In file:` annotation that does not follow the context grammar.
    #[error("malformed context annotation on dump line {line}: {text}")]
    Annotation { line: usize, text: String },

    /// A `# N:` annotation seen before any `# In file:` annotation.
    #[error("instruction number on dump line {line} has no enclosing context")]
    InstructionWithoutContext { line: usize },

    /// `</If>` without a matching `<If>`.
    #[error("unbalanced </If> on dump line {line}")]
    UnbalancedIf { line: usize },

    /// The line a macro context points at is not a `<Macro ...>` header.
    #[error("macro definition not found in {}:{line}: {text}", path.display())]
    MacroDefinition {
        path: PathBuf,
        line: u32,
        text: String,
    },

    #[error("invalid SecRule on dump line {line}: expected 2 or 3 arguments, found {found} in `{args}`")]
    SecRuleArity {
        line: usize,
        found: usize,
        args: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line} does not exist in {} ({len} lines)", path.display())]
    LineOutOfRange {
        path: PathBuf,
        line: u32,
        len: usize,
    },

    /// A macro hop whose `use` side is a bare line reference.
    #[error("malformed context chain: {context}")]
    MalformedChain { context: String },
}

impl Error {
    /// Structural errors invalidate the shared parse state and abort the
    /// whole run; the others only abandon the current directive's recovery.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Annotation { .. }
                | Error::InstructionWithoutContext { .. }
                | Error::UnbalancedIf { .. }
                | Error::MacroDefinition { .. }
                | Error::SecRuleArity { .. }
        )
    }
}
