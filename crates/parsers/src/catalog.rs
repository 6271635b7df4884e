//! Fixed ModSecurity and Apache vocabulary used when scanning arguments.
//!
//! Operator tokens share the `@name` shape of macro parameters and Apache
//! regex back-references share the `$N` shape, so both are excluded from
//! tainting. Collection names decide whether a recovered `collection.name`
//! reference is a variable or a plain constant.

use std::collections::HashSet;
use std::sync::OnceLock;

const OPERATORS: &[&str] = &[
    "rx",
    "rxglobal",
    "pm",
    "pmfromfile",
    "pmf",
    "streq",
    "contains",
    "containsword",
    "beginswith",
    "endswith",
    "within",
    "strmatch",
    "eq",
    "ne",
    "gt",
    "ge",
    "lt",
    "le",
    "detectsqli",
    "detectxss",
    "validateurlencoding",
    "validateutf8encoding",
    "validatebyterange",
    "validatehash",
    "validatedtd",
    "validateschema",
    "verifycc",
    "verifyssn",
    "verifycpf",
    "ipmatch",
    "ipmatchfromfile",
    "ipmatchf",
    "rbl",
    "geolookup",
    "gsblookup",
    "inspectfile",
    "fuzzyhash",
    "nomatch",
    "unconditionalmatch",
    "rsub",
];

const COLLECTIONS: &[&str] = &[
    "ARGS",
    "ARGS_GET",
    "ARGS_POST",
    "ARGS_NAMES",
    "ARGS_GET_NAMES",
    "ARGS_POST_NAMES",
    "ENV",
    "FILES",
    "FILES_NAMES",
    "FILES_SIZES",
    "FILES_TMPNAMES",
    "FILES_TMP_CONTENT",
    "GEO",
    "GLOBAL",
    "IP",
    "MATCHED_VARS",
    "MATCHED_VARS_NAMES",
    "MULTIPART_PART_HEADERS",
    "REQUEST_COOKIES",
    "REQUEST_COOKIES_NAMES",
    "REQUEST_HEADERS",
    "REQUEST_HEADERS_NAMES",
    "RESOURCE",
    "RESPONSE_HEADERS",
    "RESPONSE_HEADERS_NAMES",
    "RULE",
    "SESSION",
    "TX",
    "USER",
    "XML",
];

static OPERATOR_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
static COLLECTION_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn operators() -> &'static HashSet<&'static str> {
    OPERATOR_SET.get_or_init(|| OPERATORS.iter().copied().collect())
}

fn collections() -> &'static HashSet<&'static str> {
    COLLECTION_SET.get_or_init(|| COLLECTIONS.iter().copied().collect())
}

/// True for `@rx`, `@beginsWith`, … (case-insensitive).
///
/// # Example
/// ```
/// use parsers::catalog::is_operator;
/// assert!(is_operator("@beginsWith"));
/// assert!(!is_operator("@var1"));
/// ```
pub fn is_operator(token: &str) -> bool {
    token
        .strip_prefix('@')
        .is_some_and(|name| operators().contains(name.to_ascii_lowercase().as_str()))
}

/// Apache's built-in `$0`..`$9` back-references.
pub fn is_reserved_variable(token: &str) -> bool {
    token
        .strip_prefix('$')
        .is_some_and(|rest| rest.len() == 1 && rest.as_bytes()[0].is_ascii_digit())
}

/// Tokens that look like macro parameters but never are.
pub fn is_excluded_token(token: &str) -> bool {
    is_operator(token) || is_reserved_variable(token)
}

/// True when `name` is a ModSecurity collection (case-insensitive).
pub fn is_collection(name: &str) -> bool {
    collections().contains(name.to_ascii_uppercase().as_str())
}
