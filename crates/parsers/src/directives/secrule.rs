use ir::{Diagnostics, RuleVariable, SecRuleArgs, SetVar, VarRef, WarningKind};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::{Error, Result};
use crate::tokens::{split_arguments, split_top_level_commas, strip_quotes};

static VARIABLE_RE: OnceLock<Regex> = OnceLock::new();
static SETENV_RE: OnceLock<Regex> = OnceLock::new();
static SETVAR_RE: OnceLock<Regex> = OnceLock::new();

/// Parses `VARIABLES OPERATOR [ACTIONS]`.
pub fn parse_secrule(
    args: &str,
    dump_line: usize,
    node_id: u64,
    diag: &mut Diagnostics,
) -> Result<SecRuleArgs> {
    let tokens = split_arguments(args);
    if !(2..=3).contains(&tokens.len()) {
        return Err(Error::SecRuleArity {
            line: dump_line,
            found: tokens.len(),
            args: args.to_string(),
        });
    }
    let actions_raw = tokens.get(2).map(|t| strip_quotes(t)).unwrap_or_default();

    let setenv = parse_action_assignments("setenv", actions_raw);
    let setvar = parse_action_assignments("setvar", actions_raw);

    let mut rule = SecRuleArgs {
        variables: parse_variables(strip_quotes(tokens[0])),
        operator: strip_quotes(tokens[1]).to_string(),
        actions: split_top_level_commas(actions_raw)
            .into_iter()
            .map(|a| strip_quotes(a).to_string())
            .collect(),
        setenv: setenv.values.into_iter().collect(),
        setenv_no_value: setenv.no_value,
        setenv_unset: setenv.unset,
        ..Default::default()
    };

    for (key, value) in setvar.values {
        if let Some(var) = var_ref(&key, node_id, diag) {
            rule.setvar.push(SetVar {
                collection: var.collection,
                name: var.name,
                value,
            });
        }
    }
    rule.setvar_no_value = setvar
        .no_value
        .iter()
        .filter_map(|k| var_ref(k, node_id, diag))
        .collect();
    rule.setvar_unset = setvar
        .unset
        .iter()
        .filter_map(|k| var_ref(k, node_id, diag))
        .collect();
    Ok(rule)
}

fn var_ref(key: &str, node_id: u64, diag: &mut Diagnostics) -> Option<VarRef> {
    let (collection, name) = match key.split_once('.') {
        Some((c, n)) => (c.to_ascii_uppercase(), n.to_string()),
        None => (String::new(), key.to_string()),
    };
    if name.is_empty() {
        warn!(node_id, key, "Ignoring setvar without a variable name");
        diag.warn(
            WarningKind::InvalidSetvar,
            Some(node_id),
            format!("setvar `{key}` has no variable name"),
        );
        return None;
    }
    Some(VarRef { collection, name })
}

/// Splits a variables specification such as `!ARGS:foo|&TX:'/^a/'|REQUEST_URI`.
///
/// # Example
/// ```
/// use parsers::directives::parse_variables;
/// let vars = parse_variables("REQUEST_HEADERS:User-Agent|!ARGS:id|&TX");
/// assert_eq!(vars.len(), 3);
/// assert_eq!(vars[0].selector.as_deref(), Some("User-Agent"));
/// assert!(vars[1].negated);
/// assert!(vars[2].count);
/// ```
pub fn parse_variables(spec: &str) -> Vec<RuleVariable> {
    let re = VARIABLE_RE.get_or_init(|| {
        Regex::new(
            r#"\|?([!&]{0,2})([^:\s|]+)(?::('.*?'|".*?"|/.+?/|[^|]*))?"#,
        )
        .expect("valid rule variable regex")
    });
    re.captures_iter(spec)
        .map(|c| {
            let markers = c.get(1).map_or("", |m| m.as_str());
            let selector = c
                .get(3)
                .map(|m| strip_quotes(m.as_str().trim()).to_string())
                .filter(|s| !s.is_empty());
            RuleVariable {
                collection: c[2].to_ascii_uppercase(),
                selector,
                negated: markers.contains('!'),
                count: markers.contains('&'),
            }
        })
        .collect()
}

/// Key/value forms found in `setenv:` or `setvar:` actions.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Assignments {
    /// `key=value`; the value keeps everything after the first `=`.
    pub values: BTreeMap<String, String>,
    pub no_value: Vec<String>,
    /// `!key`
    pub unset: Vec<String>,
}

/// Extracts every `action:expression` of the given action name.
///
/// # Example
/// ```
/// use parsers::directives::parse_action_assignments;
/// let a = parse_action_assignments("setvar", "id:1,setvar:'tx.a=b=c',setvar:!tx.x,setvar:tx.flag");
/// assert_eq!(a.values["tx.a"], "b=c");
/// assert_eq!(a.unset, vec!["tx.x"]);
/// assert_eq!(a.no_value, vec!["tx.flag"]);
/// ```
pub fn parse_action_assignments(action: &str, actions: &str) -> Assignments {
    let re = match action {
        "setenv" => SETENV_RE.get_or_init(|| assignment_regex("setenv")),
        _ => SETVAR_RE.get_or_init(|| assignment_regex("setvar")),
    };
    let mut out = Assignments::default();
    for caps in re.captures_iter(actions) {
        let expression = caps
            .name("quotes")
            .or_else(|| caps.name("dquotes"))
            .or_else(|| caps.name("noquotes"))
            .map_or("", |m| m.as_str())
            .trim();
        if expression.is_empty() {
            continue;
        }
        if let Some(key) = expression.strip_prefix('!') {
            if !out.unset.iter().any(|k| k == key) {
                out.unset.push(key.to_string());
            }
        } else if let Some((key, value)) = expression.split_once('=') {
            out.values.insert(key.to_string(), value.to_string());
        } else if !out.no_value.iter().any(|k| k == expression) {
            out.no_value.push(expression.to_string());
        }
    }
    out
}

fn assignment_regex(action: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\b{action}:(?:'(?P<quotes>[^']*?)'|"(?P<dquotes>[^"]*?)"|(?P<noquotes>.+?))(?:,|$|"|')"#
    ))
    .expect("valid action assignment regex")
}
