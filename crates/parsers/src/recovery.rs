//! Constant recovery over a directive's macro call chain.
//!
//! The dump shows macro bodies after parameter substitution, so a constant
//! passed into a macro (`Use m ${site}`) is invisible on the directive
//! itself. Recovery walks the chain from the innermost macro outwards,
//! re-reading each hop's literal line from the original sources. An
//! argument position only contributes when it is the directive's own line
//! or when it feeds a parameter the previous (inner) hop referenced.

use ir::{Context, Diagnostics, FileContext, MacroContext, WarningKind};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::catalog::is_excluded_token;
use crate::error::{Error, Result};
use crate::locator::SourceLocator;
use crate::tokens::args_from_line;

static PARAM_RE: OnceLock<Regex> = OnceLock::new();
static CONSTANT_RE: OnceLock<Regex> = OnceLock::new();
static ENV_RE: OnceLock<Regex> = OnceLock::new();

/// One recovery pass. Taint and results accumulate as the chain is walked,
/// so a pass interrupted by an I/O error still exposes what it found.
pub struct Recovery<'a> {
    locator: &'a mut SourceLocator,
    params: HashMap<String, Vec<String>>,
    taint: HashMap<String, BTreeSet<usize>>,
    found: BTreeSet<(String, String)>,
}

impl<'a> Recovery<'a> {
    pub fn new(locator: &'a mut SourceLocator) -> Self {
        Self {
            locator,
            params: HashMap::new(),
            taint: HashMap::new(),
            found: BTreeSet::new(),
        }
    }

    /// `(collection, name)` pairs found so far; `collection` is empty for
    /// references without a dot.
    pub fn found(&self) -> &BTreeSet<(String, String)> {
        &self.found
    }

    pub fn into_found(self) -> BTreeSet<(String, String)> {
        self.found
    }

    /// Taint set recorded for `macro_name`.
    pub fn tainted(&self, macro_name: &str) -> Option<&BTreeSet<usize>> {
        self.taint.get(macro_name)
    }

    /// Walks `context` starting with `kind` (the directive name) as the
    /// first target.
    pub fn run(
        &mut self,
        context: &Context,
        kind: &str,
        node_id: u64,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let mut ptr = context;
        let mut target = kind.to_string();
        let mut initial = true;
        while let Context::Macro(hop) = ptr {
            self.visit_macro(hop, &target, initial, node_id, diag)?;
            target = hop.macro_name.clone();
            initial = false;
            ptr = &hop.used_in;
            if let Context::Line(_) = ptr {
                return Err(Error::MalformedChain {
                    context: context.to_string(),
                });
            }
        }
        if let Context::File(file) = ptr {
            self.visit_file(file, &target, initial)?;
        }
        Ok(())
    }

    fn visit_macro(
        &mut self,
        hop: &MacroContext,
        target: &str,
        initial: bool,
        node_id: u64,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        let def_path = self.locator.resolve(&hop.definition);
        let def_line = hop.definition.line_num.unwrap_or(0);
        let signature = self.locator.parse_macro_def(&def_path, def_line)?;
        self.params.insert(hop.macro_name.clone(), signature.params);

        let mut line = match hop.line_num {
            Some(offset) => self.locator.find_line(&def_path, def_line, offset, None)?,
            None => String::new(),
        };
        if line.is_empty() {
            line = self
                .locator
                .find_line(&def_path, def_line, 0, Some(target))?;
        }
        if line.is_empty() {
            let msg = format!(
                "`{target}` not found in macro {} at {}:{def_line}",
                hop.macro_name,
                def_path.display()
            );
            warn!(node_id, macro_name = %hop.macro_name, "{msg}");
            diag.warn(WarningKind::LineNotFound, Some(node_id), msg);
            return Ok(());
        }

        let args = arguments(&line);
        let positions = self.positions(&args, target, initial);
        for &i in &positions {
            self.taint_argument(&args[i], hop, node_id, diag);
        }
        self.extract(&args, &positions);
        Ok(())
    }

    fn visit_file(&mut self, file: &FileContext, target: &str, initial: bool) -> Result<()> {
        let path = self.locator.resolve(file);
        let line = self
            .locator
            .find_line(&path, file.line_num.unwrap_or(0), 0, None)?;
        let args = arguments(&line);
        let positions = self.positions(&args, target, initial);
        self.extract(&args, &positions);
        Ok(())
    }

    fn positions(&self, args: &[String], target: &str, initial: bool) -> Vec<usize> {
        let tainted = self.taint.get(target);
        (0..args.len())
            .filter(|i| initial || tainted.is_some_and(|t| t.contains(i)))
            .collect()
    }

    fn taint_argument(
        &mut self,
        arg: &str,
        hop: &MacroContext,
        node_id: u64,
        diag: &mut Diagnostics,
    ) {
        let params = self
            .params
            .get(&hop.macro_name)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let re = PARAM_RE
            .get_or_init(|| Regex::new(r"[\$@]\w+").expect("valid macro parameter regex"));
        for token in re.find_iter(arg).map(|m| m.as_str()) {
            if is_excluded_token(token) {
                continue;
            }
            match params.iter().position(|p| p == token) {
                Some(index) => {
                    self.taint
                        .entry(hop.macro_name.clone())
                        .or_default()
                        .insert(index);
                }
                None => {
                    let msg = format!(
                        "{token} not found in {} definition from {}",
                        hop.macro_name, hop.definition
                    );
                    warn!(node_id, macro_name = %hop.macro_name, token, "Unknown macro parameter");
                    diag.warn(WarningKind::UnknownParameter, Some(node_id), msg);
                }
            }
        }
    }

    fn extract(&mut self, args: &[String], positions: &[usize]) {
        for &i in positions {
            self.found.extend(constant_references(&args[i]));
        }
    }
}

/// `~{..}`, `${..}` and `%{..}` references in one argument, split into
/// `(collection, name)` on the first dot.
///
/// # Example
/// ```
/// use parsers::recovery::constant_references;
/// let refs = constant_references("%{tx.score} ${site} ~{c1}");
/// assert!(refs.contains(&("tx".to_string(), "score".to_string())));
/// assert!(refs.contains(&(String::new(), "site".to_string())));
/// assert_eq!(refs.len(), 3);
/// ```
pub fn constant_references(arg: &str) -> Vec<(String, String)> {
    let constant_re = CONSTANT_RE
        .get_or_init(|| Regex::new(r"[~$]\{(.*?)\}").expect("valid constant regex"));
    let env_re =
        ENV_RE.get_or_init(|| Regex::new(r"%\{(.*?)\}").expect("valid environment regex"));
    constant_re
        .captures_iter(arg)
        .chain(env_re.captures_iter(arg))
        .map(|c| split_reference(&c[1]))
        .collect()
}

fn arguments(line: &str) -> Vec<String> {
    args_from_line(line).unwrap_or_else(|| {
        debug!(line, "Not enough arguments on source line");
        Vec::new()
    })
}

fn split_reference(raw: &str) -> (String, String) {
    match raw.split_once('.') {
        Some((collection, name)) => (collection.to_string(), name.to_string()),
        None => (String::new(), raw.to_string()),
    }
}

/// Runs a full recovery and returns what it found.
pub fn recover_constants(
    locator: &mut SourceLocator,
    context: &Context,
    kind: &str,
    node_id: u64,
    diag: &mut Diagnostics,
) -> Result<BTreeSet<(String, String)>> {
    let mut recovery = Recovery::new(locator);
    recovery.run(context, kind, node_id, diag)?;
    Ok(recovery.into_found())
}
