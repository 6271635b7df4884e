#![allow(dead_code)]

use ir::{
    Context, DefineStr, Directive, FileContext, RemoveById, RemoveByTag, SecRuleArgs, Variant,
};
use std::collections::BTreeSet;

pub fn directive(node_id: u64, kind: &str, variant: Variant) -> Directive {
    Directive {
        location: String::new(),
        virtual_host: String::new(),
        if_level: 0,
        context: Context::File(FileContext::new(Some(node_id as u32), "/etc/httpd/conf/httpd.conf")),
        node_id,
        kind: kind.to_string(),
        conditions: Vec::new(),
        args: String::new(),
        id: None,
        tags: BTreeSet::new(),
        phase: None,
        msg: None,
        constants: Vec::new(),
        variables: Vec::new(),
        variant,
    }
}

pub fn define(node_id: u64, name: &str, value: &str) -> Directive {
    directive(
        node_id,
        "definestr",
        Variant::DefineStr(DefineStr {
            name: name.to_string(),
            value: Some(value.to_string()),
        }),
    )
}

pub fn secrule(node_id: u64, id: u64, tags: &[&str], constants: &[&str]) -> Directive {
    let mut d = directive(node_id, "secrule", Variant::SecRule(SecRuleArgs::default()));
    d.id = Some(id);
    d.phase = Some(2);
    d.tags = tags.iter().map(|t| t.to_string()).collect();
    d.constants = constants.iter().map(|c| c.to_string()).collect();
    d
}

pub fn remove_by_id(node_id: u64, ids: &[u64], ranges: &[(u64, u64)]) -> Directive {
    directive(
        node_id,
        "secruleremovebyid",
        Variant::RemoveById(RemoveById {
            ids: ids.to_vec(),
            ranges: ranges.to_vec(),
        }),
    )
}

pub fn remove_by_tag(node_id: u64, patterns: &[&str]) -> Directive {
    directive(
        node_id,
        "secruleremovebytag",
        Variant::RemoveByTag(RemoveByTag {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }),
    )
}

pub fn generic(node_id: u64, kind: &str) -> Directive {
    directive(node_id, kind, Variant::Generic)
}
