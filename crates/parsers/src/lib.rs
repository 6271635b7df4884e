//! Reading of expanded Apache/ModSecurity configuration dumps.
//!
//! [`dump::DumpParser`] walks the dump line by line and rebuilds each
//! directive's macro call chain, [`directives::DirectiveFactory`] turns the
//! lines into typed [`ir::Directive`]s and [`recovery`] traces constants
//! back through macro parameters using the [`locator::SourceLocator`].

pub mod catalog;
pub mod directives;
pub mod dump;
pub mod error;
pub mod locator;
pub mod recovery;
pub mod tokens;

pub use directives::{DirectiveFactory, Scope};
pub use dump::{parse_context_annotation, parse_dump, DumpParser};
pub use error::{Error, Result};
pub use locator::{MacroSignature, SourceLocator};
pub use recovery::{recover_constants, Recovery};
