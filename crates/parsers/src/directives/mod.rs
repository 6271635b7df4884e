//! Directive factory.
//!
//! Turns one `NAME ARGS` dump line plus the parser's scope into a
//! [`Directive`], runs constant recovery against the original sources and
//! attaches the recovered constants and variables.

mod define;
mod remove;
mod secrule;

use ir::{Context, Diagnostics, Directive, Variant, WarningKind};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::warn;

use crate::catalog::is_collection;
use crate::error::{Error, Result};
use crate::locator::SourceLocator;
use crate::recovery::Recovery;
use crate::tokens::{strip_quotes, trim_edge_quotes};

pub use define::parse_define;
pub use remove::{parse_remove_by_id, parse_remove_by_tag, MAX_RANGE_SPAN};
pub use secrule::{parse_action_assignments, parse_secrule, parse_variables, Assignments};

/// Scope the dump parser is in when it meets a directive line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scope<'a> {
    pub location: &'a str,
    pub virtual_host: &'a str,
    pub if_level: u32,
    pub conditions: &'a [String],
}

/// Fields every directive carries, extracted from its raw argument text.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommonFields {
    pub id: Option<u64>,
    pub tags: BTreeSet<String>,
    pub phase: Option<u32>,
    pub msg: Option<String>,
}

static ID_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static PHASE_RE: OnceLock<Regex> = OnceLock::new();
static MSG_RE: OnceLock<Regex> = OnceLock::new();

/// Extracts `id:`, every `tag:`, `phase:` and the first `msg:`.
///
/// # Example
/// ```
/// use parsers::directives::common_fields;
/// let f = common_fields("\"phase:request,id:942100,tag:'attack-sqli',msg:'SQL, injection'\"");
/// assert_eq!(f.id, Some(942100));
/// assert_eq!(f.phase, Some(2));
/// assert!(f.tags.contains("attack-sqli"));
/// assert_eq!(f.msg.as_deref(), Some("SQL, injection"));
/// ```
pub fn common_fields(args: &str) -> CommonFields {
    let id_re = ID_RE.get_or_init(|| Regex::new(r"\bid\s*:\s*(\d+)").expect("valid id regex"));
    let tag_re = TAG_RE
        .get_or_init(|| Regex::new(r"(?i)\btag\s*:\s*(.*?)(?:,|$)").expect("valid tag regex"));
    let phase_re = PHASE_RE.get_or_init(|| {
        Regex::new(r"(?i)\bphase\s*:\s*'?(\d+|request|response|logging)")
            .expect("valid phase regex")
    });
    let msg_re = MSG_RE.get_or_init(|| {
        Regex::new(r#"\bmsg\s*:\s*('[^']*'|"[^"]*"|[^,]*)"#).expect("valid msg regex")
    });

    let id = id_re
        .captures(args)
        .and_then(|c| c[1].parse::<u64>().ok());
    let tags = tag_re
        .captures_iter(args)
        .map(|c| trim_edge_quotes(&c[1]).to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let phase = phase_re
        .captures(args)
        .and_then(|c| phase_number(&c[1]));
    let msg = msg_re
        .captures(args)
        .map(|c| trim_edge_quotes(&c[1]).to_string())
        .filter(|m| !m.is_empty());
    CommonFields {
        id,
        tags,
        phase,
        msg,
    }
}

fn phase_number(raw: &str) -> Option<u32> {
    match raw.to_ascii_lowercase().as_str() {
        "request" => Some(2),
        "response" => Some(4),
        "logging" => Some(5),
        n => n.parse().ok(),
    }
}

/// Builds directives and attaches recovered constants. Without a locator
/// recovery is skipped and directives carry no constants.
#[derive(Debug, Default)]
pub struct DirectiveFactory {
    locator: Option<SourceLocator>,
}

impl DirectiveFactory {
    pub fn new(locator: Option<SourceLocator>) -> Self {
        Self { locator }
    }

    pub fn locator(&self) -> Option<&SourceLocator> {
        self.locator.as_ref()
    }

    pub fn into_locator(self) -> Option<SourceLocator> {
        self.locator
    }

    /// Creates the directive for `kind ARGS` seen on `dump_line`.
    ///
    /// Only structural errors are returned. Problems reading the original
    /// sources end up in `diag` and leave the constants recovered so far.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &mut self,
        scope: &Scope<'_>,
        context: &Context,
        node_id: u64,
        kind: &str,
        args: &str,
        dump_line: usize,
        diag: &mut Diagnostics,
    ) -> Result<Directive> {
        let kind = kind.to_ascii_lowercase();
        let variant = match kind.as_str() {
            "secrule" => Variant::SecRule(parse_secrule(args, dump_line, node_id, diag)?),
            "secruleremovebyid" => Variant::RemoveById(parse_remove_by_id(args, node_id, diag)),
            "secruleremovebytag" => Variant::RemoveByTag(parse_remove_by_tag(args, node_id, diag)),
            "definestr" | "setenv" => Variant::DefineStr(parse_define(args)),
            _ => Variant::Generic,
        };
        let common = common_fields(args);
        let mut directive = Directive {
            location: scope.location.to_string(),
            virtual_host: scope.virtual_host.to_string(),
            if_level: scope.if_level,
            context: context.clone(),
            node_id,
            kind,
            conditions: scope.conditions.to_vec(),
            args: args.to_string(),
            id: common.id,
            tags: common.tags,
            phase: common.phase,
            msg: common.msg,
            constants: Vec::new(),
            variables: Vec::new(),
            variant,
        };
        if let Some(locator) = self.locator.as_mut() {
            let found = recover(locator, &directive, diag)?;
            let (constants, variables) = partition(found);
            directive.constants = constants;
            directive.variables = variables;
        }
        Ok(directive)
    }
}

fn recover(
    locator: &mut SourceLocator,
    directive: &Directive,
    diag: &mut Diagnostics,
) -> Result<BTreeSet<(String, String)>> {
    let node_id = directive.node_id;
    let mut recovery = Recovery::new(locator);
    match recovery.run(&directive.context, &directive.kind, node_id, diag) {
        Ok(()) => {}
        Err(e) if e.is_structural() => return Err(e),
        Err(e @ Error::MalformedChain { .. }) => {
            warn!(node_id, error = %e, "Constant recovery abandoned");
            diag.warn(WarningKind::MalformedContext, Some(node_id), e.to_string());
            return Ok(BTreeSet::new());
        }
        Err(e) => {
            warn!(node_id, error = %e, "Constant recovery incomplete");
            diag.warn(WarningKind::SourceUnavailable, Some(node_id), e.to_string());
        }
    }
    Ok(recovery.into_found())
}

/// Splits recovered `(collection, name)` pairs into plain constants and
/// built-in collection variables.
pub fn partition(found: BTreeSet<(String, String)>) -> (Vec<String>, Vec<(String, String)>) {
    let mut constants = Vec::new();
    let mut variables = Vec::new();
    for (collection, name) in found {
        if collection.is_empty() {
            constants.push(name);
        } else if is_collection(&collection) {
            variables.push((collection.to_ascii_uppercase(), name));
        } else {
            constants.push(format!("{collection}.{name}"));
        }
    }
    (constants, variables)
}

/// Unquoted value helper shared by the variant parsers.
pub(crate) fn unquote(s: &str) -> String {
    strip_quotes(s.trim()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_without_trailing_comma_is_kept() {
        let f = common_fields("id:5,msg:'blocked'");
        assert_eq!(f.msg.as_deref(), Some("blocked"));
        assert_eq!(f.id, Some(5));
        assert_eq!(f.phase, None);
    }

    #[test]
    fn msg_ends_at_the_first_comma_outside_quotes() {
        let quoted = common_fields("\"id:5,msg:'SQL, injection',tag:sqli\"");
        assert_eq!(quoted.msg.as_deref(), Some("SQL, injection"));
        let bare = common_fields("\"id:5,msg:SQL, injection,tag:sqli\"");
        assert_eq!(bare.msg.as_deref(), Some("SQL"));
    }

    #[test]
    fn every_tag_occurrence_is_collected() {
        let f = common_fields("\"tag:'a',TAG:b,tag:\"c\"\"");
        let tags: Vec<&str> = f.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn partition_splits_known_collections() {
        let found: BTreeSet<(String, String)> = [
            ("".to_string(), "c1".to_string()),
            ("tx".to_string(), "score".to_string()),
            ("site".to_string(), "name".to_string()),
        ]
        .into_iter()
        .collect();
        let (constants, variables) = partition(found);
        assert_eq!(constants, vec!["c1", "site.name"]);
        assert_eq!(variables, vec![("TX".to_string(), "score".to_string())]);
    }
}
