#![no_main]

use libfuzzer_sys::fuzz_target;
use imagetest_reducer::{GoTestParser, ResultParser};

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let parser = GoTestParser::new().with_max_input_size(64 * 1024);
        let _ = parser.parse(raw);
    }
});
