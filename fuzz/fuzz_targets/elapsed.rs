#![no_main]

use libfuzzer_sys::fuzz_target;
use imagetest_reducer::parse_elapsed_ms;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = parse_elapsed_ms(raw);
    }
});
