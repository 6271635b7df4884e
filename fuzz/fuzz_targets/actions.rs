#![no_main]
use libfuzzer_sys::fuzz_target;
use parsers::tokens::{args_from_line, split_top_level_commas};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = args_from_line(s);
        let _ = split_top_level_commas(s);
    }
});
