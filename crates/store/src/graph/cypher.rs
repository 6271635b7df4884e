//! Cypher rendering of graph operations and a script sink that writes them
//! in cypher-shell format.

use ir::{Directive, DirectiveKind, Variant};
use serde_json::{json, Map, Value as JsonValue};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{tag_pattern, GraphOp, GraphStore, INDEXES};
use crate::error::{Error, Result};
use crate::persist::{temp_path, Staged};

/// A parametrized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Map<String, JsonValue>,
}

const BASE_MODULE: &str = r#"
UNWIND $batch AS properties
CREATE (node:Directive:$(properties.type))
SET node = properties.node_props
WITH node, properties

FOREACH (_ IN CASE WHEN properties.Location IS NOT NULL THEN [1] ELSE [] END |
    MERGE (l:Location {value: properties.Location})
    MERGE (node)-[:AtLocation]->(l)
)

FOREACH (_ IN CASE WHEN properties.VirtualHost IS NOT NULL THEN [1] ELSE [] END |
    MERGE (v:VirtualHost {value: properties.VirtualHost})
    MERGE (node)-[:InVirtualHost]->(v)
)

FOREACH (condition IN properties.conditions |
    MERGE (c:Predicate {value: condition})
    MERGE (node)-[:Has]->(c)
)

FOREACH (constant IN properties.constants |
    MERGE (co:Constant {name: constant})
    MERGE (node)-[:Uses]->(co)
)

FOREACH (var IN properties.variables |
    MERGE (vc:Collection {name: var.collection})
    MERGE (vv:Variable {name: var.name})
    MERGE (vv)-[:IsVariableOf]->(vc)
    MERGE (node)-[:Uses]->(vv)
)
"#;

const DEFINESTR_MODULE: &str = r#"
FOREACH (_ IN CASE WHEN properties.cst_value IS NOT NULL THEN [1] ELSE [] END |
    MERGE (cst:Constant {name: properties.cst_name, value: properties.cst_value})
    MERGE (node)-[:Define]->(cst)
)
FOREACH (_ IN CASE WHEN properties.cst_value IS NULL THEN [1] ELSE [] END |
    MERGE (cst2:Constant {name: properties.cst_name})
    MERGE (node)-[:Define]->(cst2)
)
"#;

const REMOVEBYID_MODULE: &str = r#"
WITH node, properties
UNWIND properties.ids_to_remove AS id
MERGE (i:Id {value: id})
MERGE (node)-[:DoesRemove]->(i)
"#;

const REMOVEBYTAG_MODULE: &str = r#"
WITH node, properties
UNWIND properties.tags_to_remove AS regex
MERGE (r:Regex {value: regex})
MERGE (node)-[:DoesRemove]->(r)
WITH r, regex
MATCH (t:Tag) WHERE t.value =~ regex
MERGE (r)-[:Match]->(t)
"#;

const RULE_MODULE: &str = r#"
FOREACH (_ IN CASE WHEN properties.phase IS NOT NULL THEN [1] ELSE [] END |
    MERGE (p:Phase {value: properties.phase})
    MERGE (node)-[:InPhase]->(p)
)

FOREACH (_ IN CASE WHEN properties.id IS NOT NULL THEN [1] ELSE [] END |
    MERGE (i:Id {value: properties.id})
    MERGE (node)-[:Has]->(i)
)

FOREACH (tag IN properties.tags |
    MERGE (t:Tag {value: tag})
    MERGE (node)-[:Has]->(t)
)
"#;

const SECRULE_MODULE: &str = r#"
FOREACH (rv IN properties.rule_vars |
    MERGE (rc:Collection {name: rv.collection})
    FOREACH (_ IN CASE WHEN rv.selector IS NULL THEN [1] ELSE [] END |
        MERGE (node)-[:Uses]->(rc)
    )
    FOREACH (_ IN CASE WHEN rv.selector IS NOT NULL THEN [1] ELSE [] END |
        MERGE (rs:Variable {name: rv.selector})
        MERGE (rs)-[:IsVariableOf]->(rc)
        MERGE (node)-[:Uses]->(rs)
    )
)

FOREACH (env IN properties.setenv_vars |
    MERGE (ec:Collection {name: "ENV"})
    MERGE (ev:Variable {name: env.name, value: env.value})
    MERGE (ev)-[:IsVariableOf]->(ec)
    MERGE (node)-[:Sets]->(ev)
)

FOREACH (name IN properties.setenv_vars_no_value |
    MERGE (en:Variable {name: name})
    MERGE (node)-[:Sets]->(en)
)

FOREACH (name IN properties.setenv_unset |
    MERGE (eu:Variable {name: name})
    MERGE (node)-[:Unsets]->(eu)
)

FOREACH (sv IN properties.setvar_vars |
    MERGE (sv1:Variable {name: sv.name, value: sv.value})
    MERGE (node)-[:Sets]->(sv1)
    FOREACH (_ IN CASE WHEN sv.collection <> "" THEN [1] ELSE [] END |
        MERGE (sc1:Collection {name: sv.collection})
        MERGE (sv1)-[:IsVariableOf]->(sc1)
    )
)

FOREACH (sv IN properties.setvar_vars_no_value |
    MERGE (sv2:Variable {name: sv.name})
    MERGE (node)-[:Sets]->(sv2)
    FOREACH (_ IN CASE WHEN sv.collection <> "" THEN [1] ELSE [] END |
        MERGE (sc2:Collection {name: sv.collection})
        MERGE (sv2)-[:IsVariableOf]->(sc2)
    )
)

FOREACH (sv IN properties.setvar_unset |
    MERGE (sv3:Variable {name: sv.name})
    MERGE (node)-[:Unsets]->(sv3)
    FOREACH (_ IN CASE WHEN sv.collection <> "" THEN [1] ELSE [] END |
        MERGE (sc3:Collection {name: sv.collection})
        MERGE (sv3)-[:IsVariableOf]->(sc3)
    )
)
"#;

/// Tags created by this batch are matched against removal patterns that
/// were flushed earlier.
const TAG_BACKMATCH_MODULE: &str = r#"
WITH node, properties
UNWIND properties.tags AS tag
MATCH (t:Tag {value: tag})
MATCH (r:Regex) WHERE tag =~ r.value
MERGE (r)-[:Match]->(t)
"#;

const RANGE_STATEMENT: &str = r#"
MATCH (node:Directive {node_id: $node_id})
UNWIND range($start, $end) AS value
MERGE (i:Id {value: value})
MERGE (node)-[:DoesRemove]->(i)
"#;

/// Cypher text of a directive batch of the given kind.
pub fn batch_query(kind: DirectiveKind) -> String {
    let mut query = String::from(BASE_MODULE);
    match kind {
        DirectiveKind::DefineStr => query.push_str(DEFINESTR_MODULE),
        DirectiveKind::RemoveById => query.push_str(REMOVEBYID_MODULE),
        DirectiveKind::RemoveByTag => query.push_str(REMOVEBYTAG_MODULE),
        DirectiveKind::SecRule => {
            query.push_str(RULE_MODULE);
            query.push_str(SECRULE_MODULE);
            query.push_str(TAG_BACKMATCH_MODULE);
        }
        DirectiveKind::Generic => {
            query.push_str(RULE_MODULE);
            query.push_str(TAG_BACKMATCH_MODULE);
        }
    }
    query
}

/// Per-directive entry of the `$batch` parameter.
pub fn batch_entry(d: &Directive) -> JsonValue {
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
    let mut entry = json!({
        "type": d.kind,
        "node_props": d.node_properties(),
        "Location": non_empty(&d.location),
        "VirtualHost": non_empty(&d.virtual_host),
        "conditions": d.conditions,
        "constants": d.constants,
        "variables": d.variables.iter()
            .map(|(c, n)| json!({"collection": c, "name": n}))
            .collect::<Vec<_>>(),
        "phase": d.phase,
        "id": d.id,
        "tags": d.tags,
    });
    let Some(obj) = entry.as_object_mut() else {
        return entry;
    };
    match &d.variant {
        Variant::Generic => {}
        Variant::DefineStr(def) => {
            obj.insert("cst_name".into(), json!(def.name));
            obj.insert("cst_value".into(), json!(def.value));
        }
        Variant::RemoveById(r) => {
            obj.insert("ids_to_remove".into(), json!(r.ids));
        }
        Variant::RemoveByTag(r) => {
            // Regex nodes only exist for patterns the matcher accepts, so
            // `=~` in the removal and back-match modules never sees a bad one.
            let patterns: Vec<&String> = r
                .patterns
                .iter()
                .filter(|p| tag_pattern(p).is_ok())
                .collect();
            obj.insert("tags_to_remove".into(), json!(patterns));
        }
        Variant::SecRule(rule) => {
            obj.insert(
                "rule_vars".into(),
                json!(rule
                    .variables
                    .iter()
                    .map(|v| json!({"collection": v.collection, "selector": v.selector}))
                    .collect::<Vec<_>>()),
            );
            obj.insert(
                "setenv_vars".into(),
                json!(rule
                    .setenv
                    .iter()
                    .map(|(n, v)| json!({"name": n, "value": v}))
                    .collect::<Vec<_>>()),
            );
            obj.insert("setenv_vars_no_value".into(), json!(rule.setenv_no_value));
            obj.insert("setenv_unset".into(), json!(rule.setenv_unset));
            obj.insert(
                "setvar_vars".into(),
                json!(rule
                    .setvar
                    .iter()
                    .map(|s| json!({"collection": s.collection, "name": s.name, "value": s.value}))
                    .collect::<Vec<_>>()),
            );
            obj.insert("setvar_vars_no_value".into(), json!(rule.setvar_no_value));
            obj.insert("setvar_unset".into(), json!(rule.setvar_unset));
        }
    }
    entry
}

/// Statements for one graph operation.
pub fn render(op: &GraphOp) -> Vec<Statement> {
    match op {
        GraphOp::MergeDirectives { kind, directives } => {
            let mut params = Map::new();
            params.insert(
                "batch".into(),
                JsonValue::Array(directives.iter().map(batch_entry).collect()),
            );
            vec![Statement {
                text: batch_query(*kind),
                params,
            }]
        }
        GraphOp::ExpandRange {
            node_id,
            start,
            end,
        } => {
            let mut params = Map::new();
            params.insert("node_id".into(), json!(node_id));
            params.insert("start".into(), json!(start));
            params.insert("end".into(), json!(end));
            vec![Statement {
                text: RANGE_STATEMENT.to_string(),
                params,
            }]
        }
        GraphOp::CreateIndexes => INDEXES
            .iter()
            .map(|(label, prop)| Statement {
                text: format!(
                    "CREATE INDEX {}_{}_idx IF NOT EXISTS FOR (n:{label}) ON (n.{prop})",
                    label.to_ascii_lowercase(),
                    prop
                ),
                params: Map::new(),
            })
            .collect(),
    }
}

/// Cypher literal for a JSON value, as accepted by `:param`.
///
/// # Example
/// ```
/// use serde_json::json;
/// use store::graph::cypher::cypher_literal;
/// assert_eq!(cypher_literal(&json!({"a b": ["it's", 1, null]})), "{`a b`: ['it\\'s', 1, null]}");
/// ```
pub fn cypher_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        JsonValue::Array(items) => format!(
            "[{}]",
            items.iter().map(cypher_literal).collect::<Vec<_>>().join(", ")
        ),
        JsonValue::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", cypher_key(k), cypher_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn cypher_key(key: &str) -> String {
    let simple = key
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        key.to_string()
    } else {
        format!("`{}`", key.replace('`', "``"))
    }
}

/// Writes every operation as a cypher-shell script. The target file only
/// appears once [`CypherScript::finish`] succeeds.
pub struct CypherScript {
    path: PathBuf,
    tmp: PathBuf,
    out: BufWriter<File>,
    statements: usize,
}

impl CypherScript {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp = temp_path(&path);
        let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
        Ok(Self {
            path,
            tmp,
            out: BufWriter::new(file),
            statements: 0,
        })
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    fn write_statement(&mut self, stmt: &Statement) -> Result<()> {
        let tmp = &self.tmp;
        for (name, value) in &stmt.params {
            writeln!(self.out, ":param {name} => {};", cypher_literal(value))
                .map_err(|e| Error::io(tmp, e))?;
        }
        writeln!(self.out, "{};", stmt.text.trim()).map_err(|e| Error::io(tmp, e))?;
        self.statements += 1;
        Ok(())
    }

    /// Flushes the script, leaving it at its temp path until the returned
    /// handle is committed.
    pub fn stage(self) -> Result<Staged> {
        let Self {
            path,
            tmp,
            out,
            statements,
        } = self;
        let staged = Staged::new(path, tmp.clone());
        let file = out
            .into_inner()
            .map_err(|e| Error::io(&tmp, e.into_error()))?;
        file.sync_all().map_err(|e| Error::io(&tmp, e))?;
        debug!(file = %staged.path().display(), statements, "Cypher script staged");
        Ok(staged)
    }

    /// Flushes the script and moves it into place.
    pub fn finish(self) -> Result<PathBuf> {
        self.stage()?.commit()
    }
}

impl GraphStore for CypherScript {
    fn clear(&mut self) -> Result<()> {
        self.write_statement(&Statement {
            text: "MATCH (n) DETACH DELETE n".to_string(),
            params: Map::new(),
        })
    }

    fn execute(&mut self, op: &GraphOp) -> Result<()> {
        for stmt in render(op) {
            self.write_statement(&stmt)?;
        }
        Ok(())
    }
}
