#![no_main]

use libfuzzer_sys::fuzz_target;
use logwheel_core::config::parse_interval;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = parse_interval(s);
    }
});
