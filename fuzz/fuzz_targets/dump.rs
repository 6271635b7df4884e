#![no_main]
use ir::Diagnostics;
use libfuzzer_sys::fuzz_target;
use parsers::{parse_dump, DirectiveFactory};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let mut factory = DirectiveFactory::new(None);
        let mut diag = Diagnostics::new();
        let _ = parse_dump(s, &mut factory, &mut diag);
    }
});
