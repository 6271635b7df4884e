use super::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::Path;

fn file(line: u32, path: &str) -> FileContext {
    FileContext::new(Some(line), path)
}

fn directive(phase: Option<u32>, if_level: u32, location: &str, node_id: u64) -> Directive {
    Directive {
        location: location.into(),
        virtual_host: String::new(),
        if_level,
        context: Context::File(file(1, "/conf/a.conf")),
        node_id,
        kind: "secaction".into(),
        conditions: vec![],
        args: String::new(),
        id: None,
        tags: BTreeSet::new(),
        phase,
        msg: None,
        constants: vec![],
        variables: vec![],
        variant: Variant::Generic,
    }
}

#[test]
fn cloned_context_is_independent_of_live_context() {
    let mut live = Context::Macro(Box::new(MacroContext::new(
        "m",
        file(2, "/etc/conf/macros.conf"),
        Context::File(file(10, "/etc/conf/site.conf")),
    )));
    live.set_line_num(Some(1));
    let emitted = live.clone();

    live.set_line_num(Some(7));
    if let Context::Macro(m) = &mut live {
        m.used_in.set_line_num(Some(99));
        m.macro_name = "other".into();
    }

    assert_eq!(emitted.line_num(), Some(1));
    let Context::Macro(m) = &emitted else {
        panic!("expected macro context");
    };
    assert_eq!(m.macro_name, "m");
    assert_eq!(m.used_in.line_num(), Some(10));
}

#[test]
fn empty_location_sorts_after_non_empty() {
    let a = directive(Some(1), 0, "", 1);
    let b = directive(Some(1), 0, "/x", 2);
    assert_eq!(a.evaluation_cmp(&b), Ordering::Greater);
    assert_eq!(b.evaluation_cmp(&a), Ordering::Less);
}

#[test]
fn phase_and_if_level_take_precedence_over_scope() {
    let early = directive(Some(1), 3, "", 9);
    let late = directive(Some(2), 0, "/x", 1);
    assert_eq!(early.evaluation_cmp(&late), Ordering::Less);

    let shallow = directive(Some(2), 0, "", 5);
    let deep = directive(Some(2), 1, "/x", 1);
    assert_eq!(shallow.evaluation_cmp(&deep), Ordering::Less);
}

#[test]
fn empty_virtual_host_sorts_after_non_empty() {
    let mut a = directive(Some(2), 0, "/x", 1);
    let mut b = directive(Some(2), 0, "/y", 2);
    a.virtual_host = String::new();
    b.virtual_host = "*:443".into();
    assert_eq!(a.evaluation_cmp(&b), Ordering::Greater);
}

#[test]
fn node_id_breaks_ties() {
    let mut list = vec![
        directive(Some(2), 0, "/x", 3),
        directive(Some(2), 0, "/y", 1),
        directive(None, 0, "", 8),
    ];
    sort_by_evaluation(&mut list);
    let ids: Vec<u64> = list.iter().map(|d| d.node_id).collect();
    assert_eq!(ids, vec![8, 1, 3]);
}

#[test]
fn real_path_rewrites_prefix_and_separators() {
    let ctx = file(1, "C:\\apache\\conf\\extra\\rules.conf");
    assert_eq!(
        ctx.to_real_path(Path::new("/srv/cfg")),
        Path::new("/srv/cfg/conf/extra/rules.conf")
    );
    let outside = file(1, "/opt/other/rules.conf");
    assert_eq!(
        outside.to_real_path(Path::new("/srv/cfg")),
        Path::new("/opt/other/rules.conf")
    );
}

#[test]
fn display_renders_chain() {
    let mut ctx = MacroContext::new(
        "inner",
        file(4, "/c/conf/m.conf"),
        Context::File(file(12, "/c/conf/site.conf")),
    );
    ctx.line_num = Some(2);
    let ctx = Context::Macro(Box::new(ctx));
    assert_eq!(
        ctx.to_string(),
        "line 2 of [inner](/c/conf/m.conf:4) used on line 12 of /c/conf/site.conf:12"
    );
    assert_eq!(
        ctx.pretty(),
        "\"inner\" : /c/conf/m.conf:4\n/c/conf/site.conf:12"
    );
    assert_eq!(ctx.depth(), 1);
    assert!(matches!(ctx.root(), Context::File(_)));
}

#[test]
fn node_properties_include_variant_fields() {
    let mut d = directive(Some(2), 0, "", 4);
    d.kind = "secruleremovebyid".into();
    d.variant = Variant::RemoveById(RemoveById {
        ids: vec![100],
        ranges: vec![(200, 203)],
    });
    d.variables = vec![("TX".into(), "score".into())];
    let props = d.node_properties();
    assert_eq!(props["node_id"], 4);
    assert_eq!(props["ids_to_remove"][0], 100);
    assert_eq!(props["ranges_to_remove"][0], "200-203");
    assert_eq!(props["variables"][0], "TX.score");
    assert_eq!(props["phase"], 2);
    assert!(!props.contains_key("msg"));
    assert_eq!(d.batch_kind(), DirectiveKind::RemoveById);
}

#[test]
fn empty_scope_is_left_out_of_node_properties() {
    let mut d = directive(None, 0, "", 1);
    let props = d.node_properties();
    assert!(!props.contains_key("Location"));
    assert!(!props.contains_key("VirtualHost"));

    d.location = "/admin".into();
    d.virtual_host = "*:443".into();
    let props = d.node_properties();
    assert_eq!(props["Location"], "/admin");
    assert_eq!(props["VirtualHost"], "*:443");
}

#[test]
fn context_serialization_is_tagged() {
    let ctx = Context::File(file(3, "/a/conf/x.conf"));
    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["kind"], "file");
    let back: Context = serde_json::from_value(json).unwrap();
    assert_eq!(back, ctx);
}

#[test]
fn diagnostics_count_by_kind() {
    let mut diag = Diagnostics::new();
    diag.warn(WarningKind::InvalidRange, Some(1), "5-3000");
    diag.warn(WarningKind::LineNotFound, None, "eof");
    diag.warn(WarningKind::InvalidRange, Some(2), "9-1");
    assert_eq!(diag.count(WarningKind::InvalidRange), 2);
    assert_eq!(diag.len(), 3);
}
