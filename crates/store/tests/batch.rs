mod common;

use common::{define, generic, remove_by_id, remove_by_tag, secrule};
use ir::DirectiveKind;
use store::{BatchLimits, BatchScheduler, GraphOp, GraphStore, MemoryGraph};

fn kinds(ops: &[GraphOp]) -> Vec<Option<DirectiveKind>> {
    ops.iter()
        .map(|op| match op {
            GraphOp::MergeDirectives { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

fn node_ids(op: &GraphOp) -> Vec<u64> {
    match op {
        GraphOp::MergeDirectives { directives, .. } => {
            directives.iter().map(|d| d.node_id).collect()
        }
        _ => Vec::new(),
    }
}

#[test]
fn define_batch_flushes_before_dependent_rules() {
    let mut scheduler = BatchScheduler::new(BatchLimits {
        generic: 2,
        small: 1,
        range_chunk: 500,
    });
    assert!(scheduler.push(define(1, "site_host", "www.example.org")).is_empty());
    assert!(scheduler.push(secrule(2, 1001, &[], &["site_host"])).is_empty());

    let ops = scheduler.push(secrule(3, 1002, &[], &["site_host"]));
    assert_eq!(
        kinds(&ops),
        vec![Some(DirectiveKind::DefineStr), Some(DirectiveKind::SecRule)]
    );
    assert_eq!(node_ids(&ops[0]), vec![1]);
    assert_eq!(node_ids(&ops[1]), vec![2, 3]);
    assert_eq!(scheduler.pending(), 0);

    let mut graph = MemoryGraph::new();
    graph.execute_all(&ops).unwrap();
    assert_eq!(graph.count_label("Constant"), 1);
    assert_eq!(graph.directives_using("site_host"), vec![2, 3]);
}

#[test]
fn merging_rules_before_their_define_splits_the_constant() {
    let mut graph = MemoryGraph::new();
    graph
        .execute(&GraphOp::MergeDirectives {
            kind: DirectiveKind::SecRule,
            directives: vec![secrule(2, 1001, &[], &["site_host"])],
        })
        .unwrap();
    graph
        .execute(&GraphOp::MergeDirectives {
            kind: DirectiveKind::DefineStr,
            directives: vec![define(1, "site_host", "www.example.org")],
        })
        .unwrap();
    assert_eq!(graph.count_label("Constant"), 2);
}

#[test]
fn define_batch_flushes_alone_at_its_threshold() {
    let mut scheduler = BatchScheduler::new(BatchLimits {
        generic: 2,
        small: 10,
        range_chunk: 500,
    });
    assert!(scheduler.push(secrule(1, 1, &[], &[])).is_empty());
    assert!(scheduler.push(define(2, "a", "1")).is_empty());
    let ops = scheduler.push(define(3, "b", "2"));
    assert_eq!(kinds(&ops), vec![Some(DirectiveKind::DefineStr)]);
    assert_eq!(scheduler.pending(), 1);
}

#[test]
fn removal_batch_uses_the_small_threshold_and_chunks_ranges() {
    let mut scheduler = BatchScheduler::new(BatchLimits {
        generic: 100,
        small: 1,
        range_chunk: 500,
    });
    let ops = scheduler.push(remove_by_id(7, &[100], &[(1, 1200)]));
    assert_eq!(ops.len(), 4);
    assert_eq!(node_ids(&ops[0]), vec![7]);
    let ranges: Vec<(u64, u64)> = ops[1..]
        .iter()
        .map(|op| match op {
            GraphOp::ExpandRange { node_id: 7, start, end } => (*start, *end),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(ranges, vec![(1, 500), (501, 1000), (1001, 1200)]);
}

#[test]
fn finish_drains_in_kind_order_then_indexes() {
    let mut scheduler = BatchScheduler::new(BatchLimits::default());
    for op in [
        generic(1, "secruleengine"),
        secrule(2, 1, &[], &[]),
        remove_by_tag(3, &["attack-.*"]),
        remove_by_id(4, &[1], &[]),
        define(5, "a", "b"),
    ]
    .map(|d| scheduler.push(d))
    {
        assert!(op.is_empty());
    }
    let ops = scheduler.finish();
    assert_eq!(
        kinds(&ops),
        vec![
            Some(DirectiveKind::DefineStr),
            Some(DirectiveKind::RemoveById),
            Some(DirectiveKind::RemoveByTag),
            Some(DirectiveKind::SecRule),
            Some(DirectiveKind::Generic),
            None,
        ]
    );
    assert_eq!(ops.last(), Some(&GraphOp::CreateIndexes));
    assert_eq!(scheduler.flushed(), 5);
    assert!(scheduler.finish().iter().all(|op| *op == GraphOp::CreateIndexes));
}
