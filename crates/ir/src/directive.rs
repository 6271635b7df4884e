//! Directive model.
//!
//! Every effective line of the dump becomes a [`Directive`]. The shared
//! fields (scope, provenance, common action fields) live on the struct; what
//! only some directive kinds carry lives in [`Variant`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::Context;

/// Batch category of a directive. The declaration order is the order in
/// which pending batches are drained at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    DefineStr,
    RemoveById,
    RemoveByTag,
    SecRule,
    Generic,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 5] = [
        DirectiveKind::DefineStr,
        DirectiveKind::RemoveById,
        DirectiveKind::RemoveByTag,
        DirectiveKind::SecRule,
        DirectiveKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectiveKind::DefineStr => "definestr",
            DirectiveKind::RemoveById => "removebyid",
            DirectiveKind::RemoveByTag => "removebytag",
            DirectiveKind::SecRule => "secrule",
            DirectiveKind::Generic => "generic",
        }
    }
}

/// One entry of a SecRule variables specification, e.g. `!ARGS:foo` or `&TX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVariable {
    /// Upper-cased collection or variable name.
    pub collection: String,
    pub selector: Option<String>,
    pub negated: bool,
    pub count: bool,
}

/// `collection.name` reference from a `setvar` action. `collection` is
/// upper-cased and empty when the key had no dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarRef {
    pub collection: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVar {
    pub collection: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecRuleArgs {
    pub variables: Vec<RuleVariable>,
    pub operator: String,
    pub actions: Vec<String>,
    pub setenv: Vec<(String, String)>,
    pub setenv_no_value: Vec<String>,
    pub setenv_unset: Vec<String>,
    pub setvar: Vec<SetVar>,
    pub setvar_no_value: Vec<VarRef>,
    pub setvar_unset: Vec<VarRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveById {
    pub ids: Vec<u64>,
    /// Inclusive `(start, end)` pairs, `start < end`.
    pub ranges: Vec<(u64, u64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveByTag {
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineStr {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum Variant {
    Generic,
    SecRule(SecRuleArgs),
    RemoveById(RemoveById),
    RemoveByTag(RemoveByTag),
    DefineStr(DefineStr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub location: String,
    pub virtual_host: String,
    pub if_level: u32,
    /// Owned copy of the parser's context at emission time.
    pub context: Context,
    pub node_id: u64,
    /// Directive name, lower-cased.
    #[serde(rename = "type")]
    pub kind: String,
    pub conditions: Vec<String>,
    pub args: String,
    pub id: Option<u64>,
    pub tags: BTreeSet<String>,
    pub phase: Option<u32>,
    pub msg: Option<String>,
    pub constants: Vec<String>,
    /// `(collection, name)` pairs for built-in collections.
    pub variables: Vec<(String, String)>,
    pub variant: Variant,
}

impl Directive {
    pub fn batch_kind(&self) -> DirectiveKind {
        match self.variant {
            Variant::Generic => DirectiveKind::Generic,
            Variant::SecRule(_) => DirectiveKind::SecRule,
            Variant::RemoveById(_) => DirectiveKind::RemoveById,
            Variant::RemoveByTag(_) => DirectiveKind::RemoveByTag,
            Variant::DefineStr(_) => DirectiveKind::DefineStr,
        }
    }

    /// Evaluation precedence: phase, then `<If>` depth, then scope breadth
    /// (an empty Location or VirtualHost is broader and sorts after a
    /// non-empty one), then emission order.
    pub fn evaluation_cmp(&self, other: &Self) -> Ordering {
        self.phase
            .cmp(&other.phase)
            .then(self.if_level.cmp(&other.if_level))
            .then_with(|| scope_cmp(&self.location, &other.location))
            .then_with(|| scope_cmp(&self.virtual_host, &other.virtual_host))
            .then(self.node_id.cmp(&other.node_id))
    }

    /// Flat property map stored on the directive's graph node. Values are
    /// scalars or lists of scalars only.
    pub fn node_properties(&self) -> Map<String, JsonValue> {
        let mut props = Map::new();
        props.insert("node_id".into(), json!(self.node_id));
        props.insert("type".into(), json!(self.kind));
        props.insert("args".into(), json!(self.args));
        if !self.location.is_empty() {
            props.insert("Location".into(), json!(self.location));
        }
        if !self.virtual_host.is_empty() {
            props.insert("VirtualHost".into(), json!(self.virtual_host));
        }
        props.insert("IfLevel".into(), json!(self.if_level));
        props.insert("conditions".into(), json!(self.conditions));
        props.insert("constants".into(), json!(self.constants));
        props.insert(
            "variables".into(),
            json!(self
                .variables
                .iter()
                .map(|(c, n)| format!("{c}.{n}"))
                .collect::<Vec<_>>()),
        );
        props.insert("Context".into(), json!(self.context.to_string()));
        if let Some(id) = self.id {
            props.insert("id".into(), json!(id));
        }
        props.insert("tags".into(), json!(self.tags));
        if let Some(phase) = self.phase {
            props.insert("phase".into(), json!(phase));
        }
        if let Some(msg) = &self.msg {
            props.insert("msg".into(), json!(msg));
        }
        match &self.variant {
            Variant::Generic => {}
            Variant::SecRule(rule) => {
                props.insert(
                    "secrule_vars".into(),
                    json!(rule
                        .variables
                        .iter()
                        .map(|v| match &v.selector {
                            Some(sel) => format!("{}:{sel}", v.collection),
                            None => v.collection.clone(),
                        })
                        .collect::<Vec<_>>()),
                );
                props.insert("secrule_op".into(), json!(rule.operator));
                props.insert("secrule_actions".into(), json!(rule.actions));
            }
            Variant::RemoveById(r) => {
                props.insert("ids_to_remove".into(), json!(r.ids));
                props.insert(
                    "ranges_to_remove".into(),
                    json!(r
                        .ranges
                        .iter()
                        .map(|(a, b)| format!("{a}-{b}"))
                        .collect::<Vec<_>>()),
                );
            }
            Variant::RemoveByTag(r) => {
                props.insert("tags_to_remove".into(), json!(r.patterns));
            }
            Variant::DefineStr(d) => {
                props.insert("cst_name".into(), json!(d.name));
                if let Some(v) = &d.value {
                    props.insert("cst_value".into(), json!(v));
                }
            }
        }
        props
    }
}

fn scope_cmp(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Sorts directives in evaluation order.
pub fn sort_by_evaluation(directives: &mut [Directive]) {
    directives.sort_by(|a, b| a.evaluation_cmp(b));
}
