use ir::DefineStr;
use regex::Regex;
use std::sync::OnceLock;

use super::unquote;

static DEFINE_RE: OnceLock<Regex> = OnceLock::new();

/// Parses `NAME [VALUE]` of `DefineStr` and `SetEnv`.
pub fn parse_define(args: &str) -> DefineStr {
    let re = DEFINE_RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<name>\S+?)(?:\s+(?P<value>.*?))?\s*$").expect("valid define regex")
    });
    match re.captures(args) {
        Some(caps) => DefineStr {
            name: unquote(&caps["name"]),
            value: caps
                .name("value")
                .map(|v| unquote(v.as_str()))
                .filter(|v| !v.is_empty()),
        },
        None => DefineStr {
            name: String::new(),
            value: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_quoted_value() {
        let d = parse_define("  site_host \"www.example.org\"");
        assert_eq!(d.name, "site_host");
        assert_eq!(d.value.as_deref(), Some("www.example.org"));
        let d = parse_define("flag");
        assert_eq!(d.name, "flag");
        assert!(d.value.is_none());
    }
}
