//! Embedded property graph.
//!
//! Mirrors the merge semantics of the Cypher statements: shared nodes are
//! matched by label and a subset of their properties, relationships are
//! created at most once per (source, kind, target).

use ir::{Directive, DirectiveKind, Variant};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::{tag_pattern, EdgeKind, GraphOp, GraphStore, DIRECTIVE_LABEL, INDEXES};
use crate::error::{Error, Result};
use crate::persist::{write_staged, Staged};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub labels: Vec<String>,
    pub props: Map<String, JsonValue>,
}

impl GraphNode {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    fn matches(&self, props: &Map<String, JsonValue>) -> bool {
        props.iter().all(|(k, v)| self.props.get(k) == Some(v))
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<(usize, usize, EdgeKind)>,
    indexes: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    graph: DiGraph<GraphNode, EdgeKind>,
    directives: HashMap<u64, NodeIndex>,
    merged: HashMap<(String, String), Vec<NodeIndex>>,
    /// Compiled pattern of every Regex node, in creation order.
    regexes: Vec<(NodeIndex, Regex)>,
    indexes: BTreeSet<String>,
}

/// Merge key of a shared node: its name for named nodes, else its value.
fn shared_key(props: &Map<String, JsonValue>) -> String {
    props
        .get("name")
        .or_else(|| props.get("value"))
        .map(JsonValue::to_string)
        .unwrap_or_default()
}

fn full_match(pattern: &str) -> Option<Regex> {
    match tag_pattern(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(error = %err, "Skipping tag pattern");
            None
        }
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn count_label(&self, label: &str) -> usize {
        self.graph
            .node_weights()
            .filter(|n| n.has_label(label))
            .count()
    }

    pub fn indexes(&self) -> &BTreeSet<String> {
        &self.indexes
    }

    pub fn directive(&self, node_id: u64) -> Option<&Map<String, JsonValue>> {
        self.directives.get(&node_id).map(|&ix| &self.graph[ix].props)
    }

    /// Properties of every directive node, keyed by node id.
    pub fn directive_properties(&self) -> BTreeMap<u64, Map<String, JsonValue>> {
        self.directives
            .iter()
            .map(|(&id, &ix)| (id, self.graph[ix].props.clone()))
            .collect()
    }

    /// Labels of the shared nodes `node_id` links to with `kind`.
    pub fn neighbours(&self, node_id: u64, kind: EdgeKind) -> Vec<&GraphNode> {
        let Some(&ix) = self.directives.get(&node_id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(ix, Direction::Outgoing)
            .filter(|e| *e.weight() == kind)
            .map(|e| &self.graph[e.target()])
            .collect()
    }

    /// Directives with a `Uses` edge to a Constant, Variable or Collection
    /// called `name`.
    pub fn directives_using(&self, name: &str) -> Vec<u64> {
        let wanted = json!(name);
        let targets = self.graph.node_indices().filter(|&ix| {
            let n = &self.graph[ix];
            (n.has_label("Constant") || n.has_label("Variable") || n.has_label("Collection"))
                && n.props.get("name") == Some(&wanted)
        });
        self.sources(targets, EdgeKind::Uses)
    }

    /// Directives that remove rule `id`, directly or through a range.
    pub fn removed_by_id(&self, id: u64) -> Vec<u64> {
        let wanted = json!(id);
        let targets = self.graph.node_indices().filter(|&ix| {
            let n = &self.graph[ix];
            n.has_label("Id") && n.props.get("value") == Some(&wanted)
        });
        self.sources(targets, EdgeKind::DoesRemove)
    }

    /// Directives whose removal pattern matches `tag`.
    pub fn removed_by_tag(&self, tag: &str) -> Vec<u64> {
        let targets = self
            .regexes
            .iter()
            .filter(|(_, re)| re.is_match(tag))
            .map(|(ix, _)| *ix);
        self.sources(targets, EdgeKind::DoesRemove)
    }

    /// Tag values linked by a `Match` edge from the Regex node `pattern`.
    pub fn matched_tags(&self, pattern: &str) -> Vec<String> {
        let wanted = json!(pattern);
        let mut tags: Vec<String> = self
            .graph
            .node_indices()
            .filter(|&ix| {
                let n = &self.graph[ix];
                n.has_label("Regex") && n.props.get("value") == Some(&wanted)
            })
            .flat_map(|ix| self.graph.edges_directed(ix, Direction::Outgoing))
            .filter(|e| *e.weight() == EdgeKind::Match)
            .filter_map(|e| self.graph[e.target()].props.get("value")?.as_str().map(String::from))
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    fn sources(&self, targets: impl Iterator<Item = NodeIndex>, kind: EdgeKind) -> Vec<u64> {
        let mut out = BTreeSet::new();
        for target in targets {
            for e in self.graph.edges_directed(target, Direction::Incoming) {
                if *e.weight() != kind {
                    continue;
                }
                let src = &self.graph[e.source()];
                if let Some(id) = src.props.get("node_id").and_then(JsonValue::as_u64) {
                    out.insert(id);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Returns the node of `label` whose properties include all of `props`,
    /// creating it when none does.
    fn merge(&mut self, label: &str, props: Map<String, JsonValue>) -> NodeIndex {
        let key = (label.to_string(), shared_key(&props));
        if let Some(found) = self
            .merged
            .get(&key)
            .and_then(|c| c.iter().find(|&&ix| self.graph[ix].matches(&props)))
        {
            return *found;
        }
        let ix = self.graph.add_node(GraphNode {
            labels: vec![label.to_string()],
            props,
        });
        self.merged.entry(key).or_default().push(ix);
        ix
    }

    fn merge_value(&mut self, label: &str, value: JsonValue) -> NodeIndex {
        let mut props = Map::new();
        props.insert("value".into(), value);
        self.merge(label, props)
    }

    fn merge_named(&mut self, label: &str, name: &str, value: Option<&str>) -> NodeIndex {
        let mut props = Map::new();
        props.insert("name".into(), json!(name));
        if let Some(v) = value {
            props.insert("value".into(), json!(v));
        }
        self.merge(label, props)
    }

    fn link(&mut self, from: NodeIndex, kind: EdgeKind, to: NodeIndex) {
        if !self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == kind)
        {
            self.graph.add_edge(from, to, kind);
        }
    }

    fn shared_nodes(&self, label: &str) -> Vec<NodeIndex> {
        self.merged
            .iter()
            .filter(|((l, _), _)| l == label)
            .flat_map(|(_, ixs)| ixs.iter().copied())
            .collect()
    }

    fn add_directive(&mut self, kind: DirectiveKind, d: &Directive) {
        let node = self.graph.add_node(GraphNode {
            labels: vec![DIRECTIVE_LABEL.to_string(), d.kind.clone()],
            props: d.node_properties(),
        });
        self.directives.insert(d.node_id, node);

        if !d.location.is_empty() {
            let l = self.merge_value("Location", json!(d.location));
            self.link(node, EdgeKind::AtLocation, l);
        }
        if !d.virtual_host.is_empty() {
            let v = self.merge_value("VirtualHost", json!(d.virtual_host));
            self.link(node, EdgeKind::InVirtualHost, v);
        }
        for condition in &d.conditions {
            let c = self.merge_value("Predicate", json!(condition));
            self.link(node, EdgeKind::Has, c);
        }
        for constant in &d.constants {
            let c = self.merge_named("Constant", constant, None);
            self.link(node, EdgeKind::Uses, c);
        }
        for (collection, name) in &d.variables {
            let c = self.merge_named("Collection", collection, None);
            let v = self.merge_named("Variable", name, None);
            self.link(v, EdgeKind::IsVariableOf, c);
            self.link(node, EdgeKind::Uses, v);
        }

        match (kind, &d.variant) {
            (DirectiveKind::DefineStr, Variant::DefineStr(def)) => {
                let c = self.merge_named("Constant", &def.name, def.value.as_deref());
                self.link(node, EdgeKind::Define, c);
            }
            (DirectiveKind::RemoveById, Variant::RemoveById(r)) => {
                for &id in &r.ids {
                    let i = self.merge_value("Id", json!(id));
                    self.link(node, EdgeKind::DoesRemove, i);
                }
            }
            (DirectiveKind::RemoveByTag, Variant::RemoveByTag(r)) => {
                for pattern in &r.patterns {
                    let Some(re) = full_match(pattern) else {
                        continue;
                    };
                    let rx = self.merge_value("Regex", json!(pattern));
                    self.link(node, EdgeKind::DoesRemove, rx);
                    if self.regexes.iter().any(|(ix, _)| *ix == rx) {
                        continue;
                    }
                    for tag in self.shared_nodes("Tag") {
                        let value = self.graph[tag].props.get("value").and_then(JsonValue::as_str);
                        if value.is_some_and(|v| re.is_match(v)) {
                            self.link(rx, EdgeKind::Match, tag);
                        }
                    }
                    self.regexes.push((rx, re));
                }
            }
            (DirectiveKind::SecRule | DirectiveKind::Generic, variant) => {
                self.add_rule_fields(node, d);
                if let Variant::SecRule(rule) = variant {
                    for var in &rule.variables {
                        let c = self.merge_named("Collection", &var.collection, None);
                        match &var.selector {
                            None => self.link(node, EdgeKind::Uses, c),
                            Some(sel) => {
                                let v = self.merge_named("Variable", sel, None);
                                self.link(v, EdgeKind::IsVariableOf, c);
                                self.link(node, EdgeKind::Uses, v);
                            }
                        }
                    }
                    let env = (!rule.setenv.is_empty())
                        .then(|| self.merge_named("Collection", "ENV", None));
                    for (name, value) in &rule.setenv {
                        let v = self.merge_named("Variable", name, Some(value));
                        if let Some(env) = env {
                            self.link(v, EdgeKind::IsVariableOf, env);
                        }
                        self.link(node, EdgeKind::Sets, v);
                    }
                    for name in &rule.setenv_no_value {
                        let v = self.merge_named("Variable", name, None);
                        self.link(node, EdgeKind::Sets, v);
                    }
                    for name in &rule.setenv_unset {
                        let v = self.merge_named("Variable", name, None);
                        self.link(node, EdgeKind::Unsets, v);
                    }
                    for sv in &rule.setvar {
                        self.add_setvar(node, EdgeKind::Sets, &sv.collection, &sv.name, Some(&sv.value));
                    }
                    for sv in &rule.setvar_no_value {
                        self.add_setvar(node, EdgeKind::Sets, &sv.collection, &sv.name, None);
                    }
                    for sv in &rule.setvar_unset {
                        self.add_setvar(node, EdgeKind::Unsets, &sv.collection, &sv.name, None);
                    }
                }
            }
            (kind, _) => {
                debug!(node_id = d.node_id, kind = kind.as_str(), "Directive batched under a foreign kind");
            }
        }
    }

    fn add_setvar(
        &mut self,
        node: NodeIndex,
        edge: EdgeKind,
        collection: &str,
        name: &str,
        value: Option<&str>,
    ) {
        let v = self.merge_named("Variable", name, value);
        self.link(node, edge, v);
        if !collection.is_empty() {
            let c = self.merge_named("Collection", collection, None);
            self.link(v, EdgeKind::IsVariableOf, c);
        }
    }

    fn add_rule_fields(&mut self, node: NodeIndex, d: &Directive) {
        if let Some(phase) = d.phase {
            let p = self.merge_value("Phase", json!(phase));
            self.link(node, EdgeKind::InPhase, p);
        }
        if let Some(id) = d.id {
            let i = self.merge_value("Id", json!(id));
            self.link(node, EdgeKind::Has, i);
        }
        for tag in &d.tags {
            let t = self.merge_value("Tag", json!(tag));
            self.link(node, EdgeKind::Has, t);
            let hits: Vec<NodeIndex> = self
                .regexes
                .iter()
                .filter(|(_, re)| re.is_match(tag))
                .map(|(rx, _)| *rx)
                .collect();
            for rx in hits {
                self.link(rx, EdgeKind::Match, t);
            }
        }
    }

    fn expand_range(&mut self, node_id: u64, start: u64, end: u64) {
        let Some(&node) = self.directives.get(&node_id) else {
            warn!(node_id, "Range expansion for an unknown directive");
            return;
        };
        for id in start..=end {
            let i = self.merge_value("Id", json!(id));
            self.link(node, EdgeKind::DoesRemove, i);
        }
    }

    /// Writes the graph as JSON next to `path`; committing the handle
    /// replaces `path`.
    pub fn stage(&self, path: &Path) -> Result<Staged> {
        let snapshot = Snapshot {
            nodes: self.graph.node_weights().cloned().collect(),
            edges: self
                .graph
                .edge_references()
                .map(|e| (e.source().index(), e.target().index(), *e.weight()))
                .collect(),
            indexes: self.indexes.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        let staged = write_staged(path, &bytes)?;
        debug!(file = %path.display(), nodes = snapshot.nodes.len(), "Graph staged");
        Ok(staged)
    }

    /// Writes the graph as JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.stage(path)?.commit().map(|_| ())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let mut graph = MemoryGraph {
            indexes: snapshot.indexes,
            ..Default::default()
        };
        let mut ixs = Vec::with_capacity(snapshot.nodes.len());
        for node in snapshot.nodes {
            let is_directive = node.has_label(DIRECTIVE_LABEL);
            let node_id = node.props.get("node_id").and_then(JsonValue::as_u64);
            let key = node
                .labels
                .first()
                .map(|l| (l.clone(), shared_key(&node.props)));
            let pattern = node
                .has_label("Regex")
                .then(|| node.props.get("value").and_then(JsonValue::as_str).and_then(full_match))
                .flatten();
            let ix = graph.graph.add_node(node);
            if let Some(re) = pattern {
                graph.regexes.push((ix, re));
            }
            match (is_directive, node_id, key) {
                (true, Some(id), _) => {
                    graph.directives.insert(id, ix);
                }
                (false, _, Some(key)) => graph.merged.entry(key).or_default().push(ix),
                _ => {}
            }
            ixs.push(ix);
        }
        for (from, to, kind) in snapshot.edges {
            if let (Some(&a), Some(&b)) = (ixs.get(from), ixs.get(to)) {
                graph.graph.add_edge(a, b, kind);
            }
        }
        Ok(graph)
    }
}

impl GraphStore for MemoryGraph {
    fn clear(&mut self) -> Result<()> {
        *self = MemoryGraph::default();
        Ok(())
    }

    fn execute(&mut self, op: &GraphOp) -> Result<()> {
        match op {
            GraphOp::MergeDirectives { kind, directives } => {
                for d in directives {
                    self.add_directive(*kind, d);
                }
            }
            GraphOp::ExpandRange {
                node_id,
                start,
                end,
            } => self.expand_range(*node_id, *start, *end),
            GraphOp::CreateIndexes => {
                self.indexes
                    .extend(INDEXES.iter().map(|(label, prop)| format!("{label}.{prop}")));
            }
        }
        Ok(())
    }
}
