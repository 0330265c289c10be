#![no_main]

use fluxaudit_core::quantize::quantize_value;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };
    let Ok(mut v) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    quantize_value(&mut v, 12);
    let once = v.clone();
    quantize_value(&mut v, 12);
    assert_eq!(v, once);
});
