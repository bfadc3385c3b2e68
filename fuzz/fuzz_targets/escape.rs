#![no_main]

use libfuzzer_sys::fuzz_target;
use logwheel_pipeline::alert::escape_into;

fuzz_target!(|data: &[u8]| {
    let mut out = Vec::new();
    escape_into(data, &mut out);
    // 이스케이프 결과는 항상 개행을 제외한 출력 가능 ASCII여야 합니다
    assert!(
        out.iter()
            .all(|&b| b == b'\n' || (0x20..=0x7e).contains(&b))
    );
});
