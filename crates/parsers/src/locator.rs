//! Access to the original (non-expanded) configuration tree.
//!
//! The dump only says *where* a directive came from. The locator re-reads
//! the real files to get the literal text at those positions, which the
//! recovery engine needs to see the arguments a macro was invoked with.

use ir::FileContext;
use regex::Regex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::tokens::{is_continued, join_continuation};

static MACRO_DEF_RE: OnceLock<Regex> = OnceLock::new();

/// Formal signature of a `<Macro NAME ARGS...>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSignature {
    pub name: String,
    pub params: Vec<String>,
}

#[derive(Debug)]
pub struct SourceLocator {
    root: PathBuf,
    files: HashMap<PathBuf, Vec<String>>,
}

impl SourceLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real path of a dump-reported file under the configuration root.
    pub fn resolve(&self, ctx: &FileContext) -> PathBuf {
        ctx.to_real_path(&self.root)
    }

    /// Number of distinct source files read so far.
    pub fn files_read(&self) -> usize {
        self.files.len()
    }

    fn lines(&mut self, path: &Path) -> Result<&[String]> {
        if let Entry::Vacant(e) = self.files.entry(path.to_path_buf()) {
            let text = fs::read_to_string(path).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(file = %path.display(), "Loaded source file");
            e.insert(text.lines().map(str::to_string).collect());
        }
        Ok(self.files.get(path).map(Vec::as_slice).unwrap_or_default())
    }

    /// Logical line found from `line_num` (1-based) of `path`.
    ///
    /// The walk first advances `offset` non-comment lines, then, when a
    /// `target` is given, keeps advancing until a line starts with the
    /// target (optionally preceded by `Use`). Physical lines joined by a
    /// trailing `\` are returned as one line. An empty string means the walk
    /// ran past the end of the file.
    pub fn find_line(
        &mut self,
        path: &Path,
        line_num: u32,
        offset: u32,
        target: Option<&str>,
    ) -> Result<String> {
        let lines = self.lines(path)?;
        let start = line_num as usize;
        if start == 0 || start > lines.len() {
            return Err(Error::LineOutOfRange {
                path: path.to_path_buf(),
                line: line_num,
                len: lines.len(),
            });
        }
        let target_re = match target {
            Some(t) if !t.is_empty() => Some(target_regex(t)),
            _ => None,
        };
        Ok(match walk(lines, start - 1, offset, target_re.as_ref()) {
            Some(idx) => logical_line(lines, idx),
            None => String::new(),
        })
    }

    /// Signature of the macro declared on `line` of `path`.
    pub fn parse_macro_def(&mut self, path: &Path, line: u32) -> Result<MacroSignature> {
        let lines = self.lines(path)?;
        let text = line
            .checked_sub(1)
            .and_then(|i| lines.get(i as usize))
            .ok_or_else(|| Error::LineOutOfRange {
                path: path.to_path_buf(),
                line,
                len: lines.len(),
            })?;
        parse_macro_header(text).ok_or_else(|| Error::MacroDefinition {
            path: path.to_path_buf(),
            line,
            text: text.clone(),
        })
    }
}

/// Parses a `<Macro NAME [ARG ...]>` header line.
///
/// # Example
/// ```
/// use parsers::locator::parse_macro_header;
/// let sig = parse_macro_header("<Macro test_macro arg1 arg2>").unwrap();
/// assert_eq!(sig.name, "test_macro");
/// assert_eq!(sig.params, vec!["arg1", "arg2"]);
/// assert!(parse_macro_header("Use test_macro a b").is_none());
/// ```
pub fn parse_macro_header(line: &str) -> Option<MacroSignature> {
    let re = MACRO_DEF_RE.get_or_init(|| {
        Regex::new(r"^\s*<\s*Macro\s+(?P<name>\w+)(?:\s+(?P<args>[^>]*))?\s*>")
            .expect("valid macro definition regex")
    });
    let caps = re.captures(line)?;
    let params = caps
        .name("args")
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Some(MacroSignature {
        name: caps["name"].to_string(),
        params,
    })
}

fn target_regex(target: &str) -> Regex {
    let pattern = format!(r"(?i)^\s*(Use)?\s*{}", regex::escape(target));
    // An escaped literal always compiles.
    Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").expect("valid fallback regex"))
}

/// Index of the line reached from `start`, or `None` past the end.
fn walk(lines: &[String], start: usize, mut offset: u32, target: Option<&Regex>) -> Option<usize> {
    let mut idx = start;
    while offset > 0 {
        idx += 1;
        let line = lines.get(idx)?;
        if line.trim().starts_with('#') {
            continue;
        }
        offset -= 1;
    }
    if let Some(re) = target {
        while !re.is_match(lines.get(idx)?) {
            idx += 1;
        }
    }
    Some(idx)
}

/// Joins the physical lines around `idx` that form one logical line.
fn logical_line(lines: &[String], idx: usize) -> String {
    let mut first = idx;
    while first > 0 && is_continued(&lines[first - 1]) {
        first -= 1;
    }
    let mut last = idx;
    while last + 1 < lines.len() && is_continued(&lines[last]) {
        last += 1;
    }
    if first == last {
        return lines[idx].clone();
    }
    join_continuation(&lines[first..=last])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn offset_skips_comment_lines() {
        let lines = owned(&["l1", "#c", "l2", "l3"]);
        assert_eq!(walk(&lines, 0, 1, None), Some(2));
        assert_eq!(walk(&lines, 0, 2, None), Some(3));
        assert_eq!(walk(&lines, 0, 3, None), None);
    }

    #[test]
    fn target_search_accepts_use_prefix() {
        let lines = owned(&["<Macro outer $a>", "  SecAction x", "  Use Inner $a", "</Macro>"]);
        let re = target_regex("inner");
        assert_eq!(walk(&lines, 0, 0, Some(&re)), Some(2));
        let re = target_regex("missing");
        assert_eq!(walk(&lines, 0, 0, Some(&re)), None);
    }

    #[test]
    fn continuation_is_rebuilt_in_both_directions() {
        let lines = owned(&["SecRule ARGS \\", "  \"@rx a\" \\", "  \"id:1\"", "next"]);
        let joined = "SecRule ARGS \"@rx a\" \"id:1\"";
        assert_eq!(logical_line(&lines, 0), joined);
        assert_eq!(logical_line(&lines, 1), joined);
        assert_eq!(logical_line(&lines, 2), joined);
        assert_eq!(logical_line(&lines, 3), "next");
    }

    #[test]
    fn macro_header_with_spaces_and_no_args() {
        let sig = parse_macro_header("   < Macro test_macro @var1 @var2>").unwrap();
        assert_eq!(sig.params, vec!["@var1", "@var2"]);
        let sig = parse_macro_header("<Macro bare>").unwrap();
        assert!(sig.params.is_empty());
    }
}
