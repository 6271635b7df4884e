//! Small text helpers shared by the directive parsers, the locator and the
//! recovery engine.

use regex::Regex;
use std::sync::OnceLock;

static ARGUMENT_RE: OnceLock<Regex> = OnceLock::new();

/// Splits a configuration line into whitespace separated tokens, keeping
/// single or double quoted runs together.
///
/// # Example
/// ```
/// use parsers::tokens::split_arguments;
/// let toks = split_arguments(r#"SecRule ARGS "@rx a b" 'id:1,deny'"#);
/// assert_eq!(toks, vec!["SecRule", "ARGS", "\"@rx a b\"", "'id:1,deny'"]);
/// ```
pub fn split_arguments(line: &str) -> Vec<&str> {
    let re = ARGUMENT_RE.get_or_init(|| {
        Regex::new(r#"(?:"[^"]*"|'[^']*'|\S)+"#).expect("valid argument regex")
    });
    re.find_iter(line).map(|m| m.as_str()).collect()
}

/// Arguments of a directive or `Use` line, without the directive keyword
/// (and without the macro name for `Use`). `None` when the line has fewer
/// than two tokens.
pub fn args_from_line(line: &str) -> Option<Vec<String>> {
    let tokens = split_arguments(line);
    if tokens.len() < 2 {
        return None;
    }
    let skip = if tokens[0].eq_ignore_ascii_case("use") {
        2
    } else {
        1
    };
    Some(tokens.into_iter().skip(skip).map(str::to_string).collect())
}

/// Removes one pair of matching surrounding quotes.
///
/// # Example
/// ```
/// use parsers::tokens::strip_quotes;
/// assert_eq!(strip_quotes("\"a b\""), "a b");
/// assert_eq!(strip_quotes("'a\""), "'a\"");
/// ```
pub fn strip_quotes(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Trims whitespace and every quote character from both ends.
pub fn trim_edge_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Splits on commas that are not inside single or double quotes.
pub fn split_top_level_commas(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits a removal list on spaces and commas, stripping surrounding quotes
/// from each item and dropping empty items.
pub fn split_list(s: &str) -> Vec<&str> {
    s.split([' ', ',', '\t'])
        .map(trim_edge_quotes)
        .filter(|t| !t.is_empty())
        .collect()
}

/// True when a physical line continues on the next one.
pub fn is_continued(line: &str) -> bool {
    line.trim_end().ends_with('\\')
}

/// Joins physical lines of one logical line, dropping the continuation
/// markers.
pub fn join_continuation<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref().trim_end();
        let part = part.strip_suffix('\\').unwrap_or(part);
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part.trim());
    }
    out
}
