mod common;

use common::{define, generic, remove_by_id, remove_by_tag, secrule};
use ir::{DirectiveKind, RuleVariable, SecRuleArgs, SetVar, VarRef, Variant};
use serde_json::json;
use store::{BatchLimits, BatchScheduler, EdgeKind, GraphStore, MemoryGraph};
use tempfile::tempdir;

fn populate(directives: Vec<ir::Directive>) -> MemoryGraph {
    let mut scheduler = BatchScheduler::new(BatchLimits::default());
    let mut graph = MemoryGraph::new();
    for d in directives {
        graph.execute_all(&scheduler.push(d)).unwrap();
    }
    graph.execute_all(&scheduler.finish()).unwrap();
    graph
}

#[test]
fn removal_patterns_match_tags_whatever_the_order() {
    // RemoveByTag drains before SecRule, so the tag arrives after the regex.
    let graph = populate(vec![
        secrule(1, 942100, &["attack-sqli", "paranoia-level/1"], &[]),
        remove_by_tag(2, &["attack-.*"]),
    ]);
    assert_eq!(graph.removed_by_tag("attack-sqli"), vec![2]);
    assert_eq!(graph.matched_tags("attack-.*"), vec!["attack-sqli"]);
    assert!(graph.removed_by_tag("paranoia-level/1").is_empty());
    assert_eq!(graph.count_label("Tag"), 2);

    let mut graph = MemoryGraph::new();
    graph
        .execute(&store::GraphOp::MergeDirectives {
            kind: DirectiveKind::SecRule,
            directives: vec![secrule(1, 942100, &["attack-sqli"], &[])],
        })
        .unwrap();
    graph
        .execute(&store::GraphOp::MergeDirectives {
            kind: DirectiveKind::RemoveByTag,
            directives: vec![remove_by_tag(2, &["attack-.*"])],
        })
        .unwrap();
    assert_eq!(graph.matched_tags("attack-.*"), vec!["attack-sqli"]);
}

#[test]
fn tag_patterns_must_match_the_whole_tag() {
    let graph = populate(vec![
        secrule(1, 1, &["xattack"], &[]),
        remove_by_tag(2, &["attack"]),
    ]);
    assert!(graph.removed_by_tag("xattack").is_empty());
    assert!(graph.matched_tags("attack").is_empty());
    assert_eq!(graph.removed_by_tag("attack"), vec![2]);
}

#[test]
fn invalid_tag_patterns_are_skipped() {
    let graph = populate(vec![
        secrule(1, 1, &["attack"], &[]),
        remove_by_tag(2, &["attack(", "attack"]),
    ]);
    assert_eq!(graph.count_label("Regex"), 1);
    assert_eq!(graph.removed_by_tag("attack"), vec![2]);
    assert!(graph.matched_tags("attack(").is_empty());
}

#[test]
fn compiled_patterns_follow_later_rules() {
    let mut graph = MemoryGraph::new();
    let patterns: Vec<String> = (0..50).map(|i| format!("group-{i}/.*")).collect();
    let refs: Vec<&str> = patterns.iter().map(String::as_str).collect();
    graph
        .execute(&store::GraphOp::MergeDirectives {
            kind: DirectiveKind::RemoveByTag,
            directives: vec![remove_by_tag(1, &refs), remove_by_tag(2, &["group-7/.*"])],
        })
        .unwrap();
    let rules: Vec<ir::Directive> = (0..200)
        .map(|i| {
            let tag = format!("group-{}/rule-{i}", i % 50);
            secrule(10 + i, 1000 + i, &[tag.as_str()], &[])
        })
        .collect();
    graph
        .execute(&store::GraphOp::MergeDirectives {
            kind: DirectiveKind::SecRule,
            directives: rules,
        })
        .unwrap();

    assert_eq!(graph.count_label("Regex"), 50);
    assert_eq!(graph.matched_tags("group-7/.*").len(), 4);
    assert_eq!(graph.removed_by_tag("group-7/rule-57"), vec![1, 2]);
    assert!(graph.removed_by_tag("group-50/rule-1").is_empty());

    graph.clear().unwrap();
    assert!(graph.removed_by_tag("group-7/rule-57").is_empty());
}

#[test]
fn removed_by_id_covers_ids_and_ranges() {
    let graph = populate(vec![
        secrule(1, 2003, &[], &[]),
        remove_by_id(2, &[100], &[(2000, 2005)]),
        remove_by_id(3, &[2003], &[]),
    ]);
    assert_eq!(graph.removed_by_id(100), vec![2]);
    assert_eq!(graph.removed_by_id(2003), vec![2, 3]);
    assert!(graph.removed_by_id(2006).is_empty());
    // The rule's own Id node is shared with the removals.
    assert_eq!(graph.count_label("Id"), 7);
}

#[test]
fn secrule_variables_and_assignments_become_shared_nodes() {
    let mut rule = secrule(1, 1, &[], &[]);
    rule.variables = vec![("TX".to_string(), "anomaly_score".to_string())];
    rule.variant = Variant::SecRule(SecRuleArgs {
        variables: vec![
            RuleVariable {
                collection: "ARGS".into(),
                selector: Some("user".into()),
                negated: false,
                count: false,
            },
            RuleVariable {
                collection: "REQUEST_URI".into(),
                selector: None,
                negated: false,
                count: false,
            },
        ],
        operator: "@rx x".into(),
        actions: vec!["id:1".into()],
        setenv: vec![("blocked".into(), "1".into())],
        setvar: vec![SetVar {
            collection: "TX".into(),
            name: "anomaly_score".into(),
            value: "+5".into(),
        }],
        setvar_unset: vec![VarRef {
            collection: String::new(),
            name: "flag".into(),
        }],
        ..Default::default()
    });
    let graph = populate(vec![rule]);

    assert_eq!(graph.directives_using("user"), vec![1]);
    assert_eq!(graph.directives_using("REQUEST_URI"), vec![1]);
    assert_eq!(graph.directives_using("anomaly_score"), vec![1]);
    let set: Vec<_> = graph
        .neighbours(1, EdgeKind::Sets)
        .into_iter()
        .map(|n| n.props.clone())
        .collect();
    assert!(set.iter().any(|p| p["name"] == "blocked" && p["value"] == "1"));
    assert!(set.iter().any(|p| p["name"] == "anomaly_score" && p["value"] == "+5"));
    assert_eq!(graph.neighbours(1, EdgeKind::Unsets).len(), 1);
    assert_eq!(graph.neighbours(1, EdgeKind::InPhase)[0].props["value"], json!(2));
}

#[test]
fn scope_nodes_are_shared_and_empty_scope_is_skipped() {
    let mut a = generic(1, "secruleengine");
    a.location = "/admin".into();
    a.conditions = vec!["true".into()];
    let mut b = generic(2, "secaction");
    b.location = "/admin".into();
    let c = generic(3, "secaction");
    let graph = populate(vec![a, b, c]);

    assert_eq!(graph.count_label("Location"), 1);
    assert_eq!(graph.count_label("VirtualHost"), 0);
    assert_eq!(graph.count_label("Predicate"), 1);
    assert_eq!(graph.count_label("Directive"), 3);
    assert!(graph.neighbours(3, EdgeKind::AtLocation).is_empty());
    assert_eq!(graph.directive(2).unwrap()["type"], json!("secaction"));
    assert_eq!(graph.directive(2).unwrap()["Location"], json!("/admin"));
    assert!(!graph.directive(3).unwrap().contains_key("Location"));
}

#[test]
fn snapshot_round_trips() {
    let graph = populate(vec![
        define(1, "site_host", "www.example.org"),
        secrule(2, 1001, &["attack"], &["site_host"]),
        remove_by_tag(3, &["att.*"]),
        remove_by_id(4, &[], &[(1000, 1002)]),
    ]);
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/site.graph.json");
    graph.save(&path).unwrap();
    assert!(!dir.path().join("nested/site.graph.json.tmp").exists());

    let loaded = MemoryGraph::load(&path).unwrap();
    assert_eq!(loaded.node_count(), graph.node_count());
    assert_eq!(loaded.edge_count(), graph.edge_count());
    assert_eq!(loaded.directive_properties(), graph.directive_properties());
    assert_eq!(loaded.indexes(), graph.indexes());
    assert!(loaded.indexes().contains("Tag.value"));
    assert_eq!(loaded.removed_by_tag("attack"), vec![3]);
    assert_eq!(loaded.removed_by_id(1001), vec![4]);
    assert_eq!(loaded.directives_using("site_host"), vec![2]);
}

#[test]
fn clear_empties_the_graph() {
    let mut graph = populate(vec![secrule(1, 1, &["a"], &[])]);
    assert!(graph.node_count() > 0);
    graph.clear().unwrap();
    assert_eq!(graph.node_count(), 0);
    assert!(graph.indexes().is_empty());
}
