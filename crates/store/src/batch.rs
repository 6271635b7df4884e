//! Per-kind batching of directives into graph operations.

use ir::{Directive, DirectiveKind, Variant};
use std::collections::BTreeMap;
use tracing::debug;

use crate::graph::GraphOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Flush threshold of every kind except SecRuleRemoveById.
    pub generic: usize,
    /// Flush threshold of SecRuleRemoveById.
    pub small: usize,
    /// Ids per range expansion.
    pub range_chunk: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            generic: 5000,
            small: 1000,
            range_chunk: 500,
        }
    }
}

impl BatchLimits {
    pub fn threshold(&self, kind: DirectiveKind) -> usize {
        match kind {
            DirectiveKind::RemoveById => self.small,
            _ => self.generic,
        }
        .max(1)
    }
}

/// Holds one pending queue per directive kind.
///
/// Pending DefineStr directives are always flushed before any other batch,
/// so constants exist before the directives that use them are merged.
///
/// # Example
/// ```
/// use store::{BatchLimits, BatchScheduler};
/// let scheduler = BatchScheduler::new(BatchLimits::default());
/// assert_eq!(scheduler.pending(), 0);
/// ```
#[derive(Debug)]
pub struct BatchScheduler {
    limits: BatchLimits,
    queues: BTreeMap<DirectiveKind, Vec<Directive>>,
    flushed: usize,
}

impl BatchScheduler {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            limits,
            queues: BTreeMap::new(),
            flushed: 0,
        }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Directives queued and not yet flushed.
    pub fn pending(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    /// Number of batches flushed so far.
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    /// Queues `d` and returns the operations of every batch it caused to
    /// flush, in the order they must be applied.
    pub fn push(&mut self, d: Directive) -> Vec<GraphOp> {
        let kind = d.batch_kind();
        let queue = self.queues.entry(kind).or_default();
        queue.push(d);
        if queue.len() < self.limits.threshold(kind) {
            return Vec::new();
        }
        let mut ops = Vec::new();
        if kind != DirectiveKind::DefineStr {
            self.flush(DirectiveKind::DefineStr, &mut ops);
        }
        self.flush(kind, &mut ops);
        ops
    }

    /// Drains every queue in kind order and ends with index creation.
    pub fn finish(&mut self) -> Vec<GraphOp> {
        let mut ops = Vec::new();
        for kind in DirectiveKind::ALL {
            self.flush(kind, &mut ops);
        }
        ops.push(GraphOp::CreateIndexes);
        ops
    }

    fn flush(&mut self, kind: DirectiveKind, ops: &mut Vec<GraphOp>) {
        let Some(directives) = self.queues.remove(&kind).filter(|q| !q.is_empty()) else {
            return;
        };
        debug!(kind = kind.as_str(), size = directives.len(), "Flushing batch");
        self.flushed += 1;
        let ranges: Vec<GraphOp> = directives
            .iter()
            .flat_map(|d| range_ops(d, self.limits.range_chunk))
            .collect();
        ops.push(GraphOp::MergeDirectives { kind, directives });
        ops.extend(ranges);
    }
}

/// Range expansions of a removal directive, at most `chunk` ids each.
fn range_ops(d: &Directive, chunk: u64) -> Vec<GraphOp> {
    let Variant::RemoveById(remove) = &d.variant else {
        return Vec::new();
    };
    let chunk = chunk.max(1);
    let mut ops = Vec::new();
    for &(start, end) in &remove.ranges {
        let mut lo = start;
        while lo <= end {
            let hi = end.min(lo.saturating_add(chunk - 1));
            ops.push(GraphOp::ExpandRange {
                node_id: d.node_id,
                start: lo,
                end: hi,
            });
            if hi == u64::MAX {
                break;
            }
            lo = hi + 1;
        }
    }
    ops
}
