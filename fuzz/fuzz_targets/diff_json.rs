#![no_main]

use fluxaudit_core::diff::{diff_json, DiffOptions, NumericReportPolicy};
use libfuzzer_sys::fuzz_target;

// Input is two JSON documents separated by a NUL byte.
fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };
    let Some(split) = data.iter().position(|b| *b == 0) else {
        return;
    };
    let (Ok(a), Ok(b)) = (
        serde_json::from_slice::<serde_json::Value>(&data[..split]),
        serde_json::from_slice::<serde_json::Value>(&data[split + 1..]),
    ) else {
        return;
    };

    assert!(diff_json(&a, &a, &DiffOptions::default()).is_empty());
    let opts = DiffOptions {
        numeric_policy: NumericReportPolicy::All,
        atol: 0.0,
    };
    let forward = diff_json(&a, &b, &opts);
    let backward = diff_json(&b, &a, &opts);
    assert_eq!(forward.len(), backward.len());
});
