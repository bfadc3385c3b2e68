#![no_main]

use libfuzzer_sys::fuzz_target;
use logwheel_pipeline::rule::RuleLoader;

fuzz_target!(|data: &[u8]| {
    // 룰 파일은 UTF-8 텍스트이므로 str만 대상입니다
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = RuleLoader::parse_line(line);
    }
});
