use ir::{Diagnostics, RemoveById, RemoveByTag, WarningKind};
use regex::Regex;
use tracing::warn;

use crate::tokens::split_list;

/// Widest `A-B` removal range accepted, as `B - A`.
pub const MAX_RANGE_SPAN: u64 = 2500;

/// Parses `SecRuleRemoveById` arguments. Malformed or oversized ranges are
/// reported and left out.
///
/// # Example
/// ```
/// use ir::Diagnostics;
/// use parsers::directives::parse_remove_by_id;
/// let mut diag = Diagnostics::new();
/// let r = parse_remove_by_id("100 200-203", 1, &mut diag);
/// assert_eq!(r.ids, vec![100]);
/// assert_eq!(r.ranges, vec![(200, 203)]);
/// ```
pub fn parse_remove_by_id(args: &str, node_id: u64, diag: &mut Diagnostics) -> RemoveById {
    let mut out = RemoveById::default();
    for item in split_list(args) {
        if let Ok(id) = item.parse::<u64>() {
            out.ids.push(id);
            continue;
        }
        match parse_range(item) {
            Some(range) => out.ranges.push(range),
            None => {
                warn!(node_id, item, "Invalid rule id range");
                diag.warn(
                    WarningKind::InvalidRange,
                    Some(node_id),
                    format!("{item} is an invalid range"),
                );
            }
        }
    }
    out
}

fn parse_range(item: &str) -> Option<(u64, u64)> {
    let (a, b) = item.split_once('-')?;
    if a.is_empty() || b.is_empty() || !a.bytes().chain(b.bytes()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (start, end) = (a.parse::<u64>().ok()?, b.parse::<u64>().ok()?);
    (start < end && end - start <= MAX_RANGE_SPAN).then_some((start, end))
}

/// Parses `SecRuleRemoveByTag` arguments into tag patterns. Patterns that
/// are not valid regular expressions are kept but reported.
pub fn parse_remove_by_tag(args: &str, node_id: u64, diag: &mut Diagnostics) -> RemoveByTag {
    let patterns: Vec<String> = split_list(args).into_iter().map(str::to_string).collect();
    for p in &patterns {
        if let Err(e) = Regex::new(p) {
            warn!(node_id, pattern = %p, "Invalid tag pattern");
            diag.warn(
                WarningKind::InvalidPattern,
                Some(node_id),
                format!("{p}: {e}"),
            );
        }
    }
    RemoveByTag { patterns }
}
